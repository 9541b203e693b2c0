// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeta_chain_types::{CrosschainError, CrosschainResult};

/// Threshold for observation ballots, in basis points of the observer set.
pub const BALLOT_THRESHOLD_BPS: u64 = 6667;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteType {
    SuccessObservation,
    FailureObservation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BallotStatus {
    InProgress,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationType {
    InboundTx,
    OutboundTx,
    BlockHeader,
}

/// A per-observation voting object. Voters are the observer set at ballot
/// creation; one vote per voter; finalizes at the supermajority threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub ballot_identifier: String,
    pub observation_type: ObservationType,
    pub voter_list: Vec<String>,
    pub votes: BTreeMap<String, VoteType>,
    pub threshold_bps: u64,
    pub status: BallotStatus,
}

impl Ballot {
    pub fn new(
        ballot_identifier: String,
        observation_type: ObservationType,
        voter_list: Vec<String>,
    ) -> Self {
        Self {
            ballot_identifier,
            observation_type,
            voter_list,
            votes: BTreeMap::new(),
            threshold_bps: BALLOT_THRESHOLD_BPS,
            status: BallotStatus::InProgress,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.status == BallotStatus::Finalized
    }

    pub fn has_voted(&self, voter: &str) -> bool {
        self.votes.contains_key(voter)
    }

    /// Record a vote. Returns true when this vote crossed the threshold and
    /// finalized the ballot.
    pub fn add_vote(&mut self, voter: &str, vote: VoteType) -> CrosschainResult<bool> {
        if !self.voter_list.iter().any(|v| v == voter) {
            return Err(CrosschainError::NotAuthorized(voter.to_string()));
        }
        if self.has_voted(voter) {
            return Err(CrosschainError::DuplicateVote(voter.to_string()));
        }
        self.votes.insert(voter.to_string(), vote);
        if self.status == BallotStatus::InProgress && self.threshold_reached() {
            self.status = BallotStatus::Finalized;
            return Ok(true);
        }
        Ok(false)
    }

    fn threshold_reached(&self) -> bool {
        let success = self
            .votes
            .values()
            .filter(|v| **v == VoteType::SuccessObservation)
            .count() as u64;
        let total = self.voter_list.len() as u64;
        total > 0 && success * 10_000 >= self.threshold_bps * total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observers(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("zeta1observer{i}")).collect()
    }

    #[test]
    fn test_single_observer_finalizes_immediately() {
        let mut ballot = Ballot::new("b1".to_string(), ObservationType::InboundTx, observers(1));
        let finalized = ballot
            .add_vote("zeta1observer0", VoteType::SuccessObservation)
            .unwrap();
        assert!(finalized);
        assert!(ballot.is_finalized());
    }

    #[test]
    fn test_supermajority_of_three() {
        let mut ballot = Ballot::new("b1".to_string(), ObservationType::InboundTx, observers(3));
        assert!(!ballot
            .add_vote("zeta1observer0", VoteType::SuccessObservation)
            .unwrap());
        // 2/3 = 6666 bps < 6667: not yet finalized
        assert!(!ballot
            .add_vote("zeta1observer1", VoteType::SuccessObservation)
            .unwrap());
        assert!(ballot
            .add_vote("zeta1observer2", VoteType::SuccessObservation)
            .unwrap());
    }

    #[test]
    fn test_supermajority_of_four() {
        let mut ballot = Ballot::new("b1".to_string(), ObservationType::InboundTx, observers(4));
        assert!(!ballot
            .add_vote("zeta1observer0", VoteType::SuccessObservation)
            .unwrap());
        assert!(!ballot
            .add_vote("zeta1observer1", VoteType::SuccessObservation)
            .unwrap());
        // 3/4 = 7500 bps crosses 6667
        assert!(ballot
            .add_vote("zeta1observer2", VoteType::SuccessObservation)
            .unwrap());
        // a straggler vote does not re-finalize
        assert!(!ballot
            .add_vote("zeta1observer3", VoteType::SuccessObservation)
            .unwrap());
    }

    #[test]
    fn test_failure_votes_do_not_count_toward_threshold() {
        let mut ballot = Ballot::new("b1".to_string(), ObservationType::InboundTx, observers(2));
        assert!(!ballot
            .add_vote("zeta1observer0", VoteType::FailureObservation)
            .unwrap());
        assert!(!ballot.is_finalized());
    }

    #[test]
    fn test_double_vote_rejected() {
        let mut ballot = Ballot::new("b1".to_string(), ObservationType::InboundTx, observers(3));
        ballot
            .add_vote("zeta1observer0", VoteType::SuccessObservation)
            .unwrap();
        assert!(matches!(
            ballot.add_vote("zeta1observer0", VoteType::SuccessObservation),
            Err(CrosschainError::DuplicateVote(_))
        ));
    }

    #[test]
    fn test_non_member_rejected() {
        let mut ballot = Ballot::new("b1".to_string(), ObservationType::InboundTx, observers(3));
        assert!(matches!(
            ballot.add_vote("zeta1stranger", VoteType::SuccessObservation),
            Err(CrosschainError::NotAuthorized(_))
        ));
    }
}
