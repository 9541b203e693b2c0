// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;
use zeta_chain_types::CrosschainError;

/// Client-side error type. Transient RPC failures are recovered locally
/// (cursor rollback, retry next tick); everything else is surfaced.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("invalid rpc response: {0}")]
    InvalidResponse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("tss signer error: {0}")]
    Tss(String),

    #[error("db error: {0}")]
    Db(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("zetacore error: {0}")]
    Core(#[from] CrosschainError),
}

impl ClientError {
    /// Whether the caller should retry next tick instead of surfacing.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Rpc(_) | ClientError::NotFound(_))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
