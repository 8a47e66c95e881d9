use std::path::Path;
use std::time::Duration;

use error::{ClientError, Result};
pub use solana::SolanaAgent;
use token_sale_core::interface::{ChainConfig, SaleMetadata, SaleParams, SaleSummary};
use token_sale_core::{Identity, SaleRecord};
use tracing::{debug, info, instrument};

pub mod error;
pub mod solana;

/// Network-specific token sale operations.
///
/// Implementors submit the three sale instructions and read sale accounts
/// back from the ledger.
#[async_trait::async_trait]
pub trait SaleAgent: Send + Sync {
    /// Derive the sale address, create the vault and deposit the tokens.
    ///
    /// # Returns
    /// Metadata consumed later by `claim` and `cancel`
    async fn initialize_sale(&self, params: &SaleParams) -> Result<SaleMetadata>;

    /// Pay the fee and receive one allocation.
    async fn claim(&self, metadata: &SaleMetadata) -> Result<()>;

    /// Return the undistributed tokens and close the sale.
    ///
    /// # Preconditions
    /// - The signing payer is the sale authority
    async fn cancel_sale(&self, metadata: &SaleMetadata) -> Result<()>;

    /// The record at `sale`, or `None` if no live sale is there.
    async fn fetch_sale(&self, sale: &Identity) -> Result<Option<SaleRecord>>;

    /// Every live sale owned by the program.
    async fn list_sales(&self) -> Result<Vec<(Identity, SaleRecord)>>;

    async fn mint_decimals(&self, mint: &Identity) -> Result<u8>;
}

/// How long to wait for submitted changes to become visible.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            attempts: 30,
        }
    }
}

/// Token sale client driving a [`SaleAgent`].
pub struct SaleClient {
    pub agent: Box<dyn SaleAgent>,
    poll: PollConfig,
}

impl SaleClient {
    /// Client for the Solana network described by `config`.
    pub fn new(
        config: &ChainConfig,
        taker_keypair_path: Option<&Path>,
        poll: PollConfig,
    ) -> Result<Self> {
        let agent = SolanaAgent::new(config, taker_keypair_path)?;
        Ok(Self::with_agent(Box::new(agent), poll))
    }

    pub fn with_agent(agent: Box<dyn SaleAgent>, poll: PollConfig) -> Self {
        Self { agent, poll }
    }

    /// Initializes a sale and waits until its record is visible.
    #[instrument(skip_all)]
    pub async fn init(&self, params: &SaleParams) -> Result<(SaleMetadata, SaleRecord)> {
        let metadata = self.agent.initialize_sale(params).await?;
        let record = self.wait_for_record(&metadata.sale).await?;
        info!(sale = %metadata.sale, "Token sale initialized");
        Ok((metadata, record))
    }

    /// Claims one allocation and returns the updated record.
    #[instrument(skip_all, fields(sale = %metadata.sale))]
    pub async fn claim(&self, metadata: &SaleMetadata) -> Result<SaleRecord> {
        self.agent.claim(metadata).await?;
        let record = self
            .agent
            .fetch_sale(&metadata.sale)
            .await?
            .ok_or(ClientError::AccountNotFound(metadata.sale))?;
        info!(
            num_claims = record.num_claims,
            remaining = record.remaining,
            "Claimed"
        );
        Ok(record)
    }

    /// Cancels a sale and waits until its record is gone.
    #[instrument(skip_all, fields(sale = %metadata.sale))]
    pub async fn cancel(&self, metadata: &SaleMetadata) -> Result<()> {
        self.agent.cancel_sale(metadata).await?;
        self.wait_for_removal(&metadata.sale).await?;
        info!("Token sale closed");
        Ok(())
    }

    /// Human-readable views of every live sale.
    pub async fn summaries(&self) -> Result<Vec<SaleSummary>> {
        let mut summaries = Vec::new();
        for (sale, record) in self.agent.list_sales().await? {
            let decimals = self.agent.mint_decimals(&record.mint).await?;
            summaries.push(SaleSummary::new(sale, &record, decimals)?);
        }
        Ok(summaries)
    }

    pub async fn summary(&self, sale: &Identity, record: &SaleRecord) -> Result<SaleSummary> {
        let decimals = self.agent.mint_decimals(&record.mint).await?;
        Ok(SaleSummary::new(*sale, record, decimals)?)
    }

    async fn wait_for_record(&self, sale: &Identity) -> Result<SaleRecord> {
        for attempt in 1..=self.poll.attempts {
            if let Some(record) = self.agent.fetch_sale(sale).await? {
                return Ok(record);
            }
            debug!(attempt, "Sale not visible yet");
            tokio::time::sleep(self.poll.interval).await;
        }
        Err(ClientError::Timeout {
            sale: *sale,
            attempts: self.poll.attempts,
        })
    }

    async fn wait_for_removal(&self, sale: &Identity) -> Result<()> {
        for attempt in 1..=self.poll.attempts {
            if self.agent.fetch_sale(sale).await?.is_none() {
                return Ok(());
            }
            debug!(attempt, "Sale still open");
            tokio::time::sleep(self.poll.interval).await;
        }
        Err(ClientError::Timeout {
            sale: *sale,
            attempts: self.poll.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use token_sale_core::ledger::LAMPORTS_PER_SOL;
    use token_sale_core::{
        CancelAccounts, ClaimAccounts, InitializeAccounts, MemoryLedger, SaleError, SaleState,
        TokenSale,
    };

    use super::*;

    /// Runs the sale program against an in-memory ledger. Records become
    /// visible only after `lag` fetches, like a lagging RPC node.
    struct LocalAgent {
        ledger: MemoryLedger,
        program: TokenSale,
        authority: Identity,
        taker: Identity,
        taker_account: Identity,
        lag: u32,
        fetches: AtomicU32,
    }

    impl LocalAgent {
        fn new(lag: u32) -> Self {
            let ledger = MemoryLedger::new();
            let program = TokenSale::new(Identity::hashed("token-sale-program"));
            let mint = Identity::hashed("mint");
            ledger.create_mint(&mint, 1).unwrap();

            let authority = Identity::hashed("alice");
            ledger.airdrop(&authority, 10 * LAMPORTS_PER_SOL).unwrap();
            let funding = Identity::hashed("alice-funding");
            ledger.open_asset_account(&funding, &mint, &authority).unwrap();
            ledger.mint_to(&funding, 2_000_000).unwrap();

            let taker = Identity::hashed("bob");
            ledger.airdrop(&taker, LAMPORTS_PER_SOL).unwrap();
            let taker_account = Identity::hashed("bob-receiving");
            ledger.open_asset_account(&taker_account, &mint, &taker).unwrap();

            Self {
                ledger,
                program,
                authority,
                taker,
                taker_account,
                lag,
                fetches: AtomicU32::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl SaleAgent for LocalAgent {
        async fn initialize_sale(&self, params: &SaleParams) -> Result<SaleMetadata> {
            let (sale, nonce) = self.program.sale_address(&self.authority)?;
            let vault = Identity::hashed("alice-vault");
            let funding = Identity::hashed("alice-funding");
            self.program.initialize(
                &self.ledger,
                &[self.authority, vault],
                &InitializeAccounts {
                    authority: self.authority,
                    mint: params.mint,
                    funding_account: funding,
                    record: sale,
                    vault,
                },
                params.args,
            )?;
            Ok(SaleMetadata {
                chain_config: params.chain_config.clone(),
                authority: self.authority,
                sale,
                nonce,
                vault,
                mint: params.mint,
                funding_account: funding,
                args: params.args,
                state: SaleState::Active,
            })
        }

        async fn claim(&self, metadata: &SaleMetadata) -> Result<()> {
            self.program.claim(
                &self.ledger,
                &[self.taker],
                &ClaimAccounts {
                    taker: self.taker,
                    authority: metadata.authority,
                    record: metadata.sale,
                    vault: metadata.vault,
                    taker_account: self.taker_account,
                },
            )?;
            Ok(())
        }

        async fn cancel_sale(&self, metadata: &SaleMetadata) -> Result<()> {
            self.program.cancel(
                &self.ledger,
                &[self.authority],
                &CancelAccounts {
                    authority: metadata.authority,
                    record: metadata.sale,
                    vault: metadata.vault,
                    receiving_account: metadata.funding_account,
                },
            )?;
            Ok(())
        }

        async fn fetch_sale(&self, _sale: &Identity) -> Result<Option<SaleRecord>> {
            if self.fetches.fetch_add(1, Ordering::SeqCst) < self.lag {
                return Ok(None);
            }
            Ok(self.program.fetch(&self.ledger, &self.authority)?)
        }

        async fn list_sales(&self) -> Result<Vec<(Identity, SaleRecord)>> {
            Ok(self.program.all(&self.ledger))
        }

        async fn mint_decimals(&self, _mint: &Identity) -> Result<u8> {
            Ok(1)
        }
    }

    fn params() -> SaleParams {
        SaleParams {
            chain_config: ChainConfig {
                rpc_url: "http://127.0.0.1:8899".to_string(),
                keypair_path: "id.json".to_string(),
                program_id: Identity::hashed("token-sale-program"),
            },
            mint: Identity::hashed("mint"),
            args: token_sale_core::InitializeArgs {
                total_deposited: 2_000_000,
                claim_size: 500_000,
                fee: 100_000_000,
                max_claims: 4,
            },
        }
    }

    fn fast_poll(attempts: u32) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(1),
            attempts,
        }
    }

    #[tokio::test]
    async fn init_claim_cancel_round() {
        let client = SaleClient::with_agent(Box::new(LocalAgent::new(2)), fast_poll(5));

        let (metadata, record) = client.init(&params()).await.unwrap();
        assert_eq!(record.remaining, 2_000_000);
        assert_eq!(metadata.args.max_claims, 4);

        let record = client.claim(&metadata).await.unwrap();
        assert_eq!(record.num_claims, 1);
        assert_eq!(record.remaining, 1_500_000);

        let summaries = client.summaries().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].remaining, "150000.0");

        client.cancel(&metadata).await.unwrap();
        assert!(client.summaries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn polling_gives_up() {
        let client = SaleClient::with_agent(Box::new(LocalAgent::new(10)), fast_poll(3));
        let err = client.init(&params()).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn program_errors_surface() {
        let client = SaleClient::with_agent(Box::new(LocalAgent::new(0)), fast_poll(1));
        let mut params = params();
        params.args.claim_size = 0;
        let err = client.init(&params).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Sale(SaleError::InvalidParameters(_))
        ));
    }
}
