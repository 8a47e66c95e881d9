use token_sale_core::{Identity, SaleError};

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("Keypair error: {0}")]
    Keypair(String),
    #[error("Token sale error: {0}")]
    Sale(#[from] SaleError),
    #[error("Account decode error: {0}")]
    Decode(String),
    #[error("Account not found: {0}")]
    AccountNotFound(Identity),
    #[error("Timed out after {attempts} polls waiting on sale {sale}")]
    Timeout { sale: Identity, attempts: u32 },
    #[error("RPC client error")]
    SolanaRpcClient(#[from] solana_client::client_error::ClientError),
}

impl From<anchor_lang::error::Error> for ClientError {
    fn from(value: anchor_lang::error::Error) -> Self {
        Self::Decode(value.to_string())
    }
}
