use std::path::Path;

use anchor_lang::{AccountDeserialize, InstructionData, ToAccountMetas};
use anchor_spl::associated_token::get_associated_token_address;
use solana_client::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::system_program;
use solana_sdk::transaction::Transaction;
use token_sale_core::interface::{ChainConfig, SaleMetadata, SaleParams};
use token_sale_core::{Identity, SaleError, SaleRecord, SaleState, TokenSale};
use tracing::{debug, info, instrument};

use crate::error::{ClientError, Result};
use crate::SaleAgent;

/// Instruction tag of the associated token program's idempotent create.
const CREATE_IDEMPOTENT: u8 = 1;

/// Token sale agent for interacting with the Solana network
pub struct SolanaAgent {
    // JSON-RPC client of a remote Solana node
    client: RpcClient,
    // Fee payer; the sale authority for init and cancel
    payer: Keypair,
    // Buyer signing claims, if different from the payer
    taker: Option<Keypair>,
    // On-chain token sale program ID
    program_id: Pubkey,
}

fn pubkey(id: &Identity) -> Pubkey {
    Pubkey::new_from_array(id.to_bytes())
}

fn identity(pk: &Pubkey) -> Identity {
    Identity::new(pk.to_bytes())
}

/// Only the recorded authority may cancel.
fn ensure_authority(payer: &Pubkey, metadata: &SaleMetadata) -> Result<()> {
    if identity(payer) != metadata.authority {
        return Err(SaleError::Unauthorized("payer keypair is not the sale authority").into());
    }
    Ok(())
}

impl SolanaAgent {
    /// Create a new SolanaAgent, reading keypairs and program ID.
    #[instrument(skip_all, fields(rpc_url = %config.rpc_url, program_id = %config.program_id))]
    pub fn new(config: &ChainConfig, taker_keypair_path: Option<&Path>) -> Result<Self> {
        let payer = read_keypair_file(&config.keypair_path)
            .map_err(|e| ClientError::Keypair(e.to_string()))?;
        debug!(payer = %payer.pubkey(), "Loaded payer keypair");

        let taker = match taker_keypair_path {
            Some(path) => {
                let kp = read_keypair_file(path).map_err(|e| ClientError::Keypair(e.to_string()))?;
                debug!(taker = %kp.pubkey(), "Loaded taker keypair");
                Some(kp)
            }
            None => None,
        };

        let client =
            RpcClient::new_with_commitment(config.rpc_url.clone(), CommitmentConfig::confirmed());
        Ok(Self {
            client,
            payer,
            taker,
            program_id: pubkey(&config.program_id),
        })
    }

    fn send(
        &self,
        instructions: &[Instruction],
        payer: &Keypair,
        extra: &[&Keypair],
    ) -> Result<Signature> {
        let recent_hash = self.client.get_latest_blockhash()?;
        debug!(blockhash = %recent_hash, "Fetched recent blockhash");

        let mut signers = vec![payer];
        signers.extend_from_slice(extra);
        let tx = Transaction::new_signed_with_payer(
            instructions,
            Some(&payer.pubkey()),
            &signers,
            recent_hash,
        );
        let signature = self.client.send_and_confirm_transaction(&tx)?;
        info!(%signature, "Transaction confirmed");
        Ok(signature)
    }

    /// The wallet's associated token account for `mint`, plus an
    /// instruction creating it when it does not exist yet.
    fn token_account(
        &self,
        payer: &Pubkey,
        wallet: &Pubkey,
        mint: &Pubkey,
    ) -> (Pubkey, Instruction) {
        let address = get_associated_token_address(wallet, mint);
        let ix = Instruction {
            program_id: anchor_spl::associated_token::ID,
            accounts: vec![
                AccountMeta::new(*payer, true),
                AccountMeta::new(address, false),
                AccountMeta::new_readonly(*wallet, false),
                AccountMeta::new_readonly(*mint, false),
                AccountMeta::new_readonly(system_program::ID, false),
                AccountMeta::new_readonly(anchor_spl::token::ID, false),
            ],
            data: vec![CREATE_IDEMPOTENT],
        };
        (address, ix)
    }
}

#[async_trait::async_trait]
impl SaleAgent for SolanaAgent {
    #[instrument(skip_all, fields(
        mint = %params.mint,
        total_deposited = params.args.total_deposited,
        claim_size = params.args.claim_size,
        max_claims = params.args.max_claims,
        fee = params.args.fee,
    ))]
    async fn initialize_sale(&self, params: &SaleParams) -> Result<SaleMetadata> {
        let authority = self.payer.pubkey();
        let mint = pubkey(&params.mint);
        let program = TokenSale::new(identity(&self.program_id));
        let (sale, nonce) = program.sale_address(&identity(&authority))?;
        info!(sale = %sale, nonce, "Derived sale address");

        let (funding, create_funding) = self.token_account(&authority, &authority, &mint);
        let vault = Keypair::new();

        let ix = Instruction {
            program_id: self.program_id,
            accounts: token_sale::accounts::InitializeTokenSale {
                initializer: authority,
                mint,
                initializer_token_account: funding,
                sale: pubkey(&sale),
                vault: vault.pubkey(),
                token_program: anchor_spl::token::ID,
                system_program: system_program::ID,
            }
            .to_account_metas(None),
            data: token_sale::instruction::InitializeTokenSale {
                total_deposited: params.args.total_deposited,
                claim_size: params.args.claim_size,
                fee: params.args.fee,
                max_claims: params.args.max_claims,
            }
            .data(),
        };
        debug!("InitializeTokenSale instruction built");
        self.send(&[create_funding, ix], &self.payer, &[&vault])?;

        Ok(SaleMetadata {
            chain_config: params.chain_config.clone(),
            authority: identity(&authority),
            sale,
            nonce,
            vault: identity(&vault.pubkey()),
            mint: params.mint,
            funding_account: identity(&funding),
            args: params.args,
            state: SaleState::Active,
        })
    }

    #[instrument(skip_all, fields(sale = %metadata.sale))]
    async fn claim(&self, metadata: &SaleMetadata) -> Result<()> {
        let taker = self.taker.as_ref().unwrap_or(&self.payer);
        let mint = pubkey(&metadata.mint);
        let (taker_account, create_account) =
            self.token_account(&taker.pubkey(), &taker.pubkey(), &mint);

        let ix = Instruction {
            program_id: self.program_id,
            accounts: token_sale::accounts::SellTokens {
                taker: taker.pubkey(),
                initializer: pubkey(&metadata.authority),
                sale: pubkey(&metadata.sale),
                mint,
                vault: pubkey(&metadata.vault),
                taker_token_account: taker_account,
                system_program: system_program::ID,
                token_program: anchor_spl::token::ID,
            }
            .to_account_metas(None),
            data: token_sale::instruction::SellTokens {}.data(),
        };
        debug!(taker = %taker.pubkey(), "SellTokens instruction built");
        self.send(&[create_account, ix], taker, &[])?;
        Ok(())
    }

    #[instrument(skip_all, fields(sale = %metadata.sale))]
    async fn cancel_sale(&self, metadata: &SaleMetadata) -> Result<()> {
        let authority = self.payer.pubkey();
        ensure_authority(&authority, metadata)?;

        let ix = Instruction {
            program_id: self.program_id,
            accounts: token_sale::accounts::CancelTokenSale {
                initializer: authority,
                sale: pubkey(&metadata.sale),
                mint: pubkey(&metadata.mint),
                vault: pubkey(&metadata.vault),
                initializer_token_account: pubkey(&metadata.funding_account),
                token_program: anchor_spl::token::ID,
            }
            .to_account_metas(None),
            data: token_sale::instruction::CancelTokenSale {}.data(),
        };
        debug!("CancelTokenSale instruction built");
        self.send(&[ix], &self.payer, &[])?;
        Ok(())
    }

    async fn fetch_sale(&self, sale: &Identity) -> Result<Option<SaleRecord>> {
        let account = self
            .client
            .get_account_with_commitment(&pubkey(sale), CommitmentConfig::confirmed())?
            .value;
        match account {
            Some(account) if account.owner == self.program_id => {
                let record =
                    SaleRecord::from_account_data(&account.data).map_err(SaleError::from)?;
                Ok(Some(record))
            }
            _ => Ok(None),
        }
    }

    async fn list_sales(&self) -> Result<Vec<(Identity, SaleRecord)>> {
        let accounts = self.client.get_program_accounts(&self.program_id)?;
        Ok(accounts
            .into_iter()
            .filter_map(|(address, account)| {
                SaleRecord::from_account_data(&account.data)
                    .ok()
                    .map(|record| (identity(&address), record))
            })
            .collect())
    }

    async fn mint_decimals(&self, mint: &Identity) -> Result<u8> {
        let account = self
            .client
            .get_account_with_commitment(&pubkey(mint), CommitmentConfig::confirmed())?
            .value
            .ok_or(ClientError::AccountNotFound(*mint))?;
        let mint = anchor_spl::token::Mint::try_deserialize(&mut account.data.as_slice())?;
        Ok(mint.decimals)
    }
}
