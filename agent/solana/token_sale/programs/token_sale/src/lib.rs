#![allow(unexpected_cfgs)]

use anchor_lang::prelude::*;
use anchor_lang::system_program;
use anchor_spl::token::{self, CloseAccount, Mint, Token, TokenAccount, TransferChecked};

declare_id!("EUH9RrCQfQhu1Fq4X1Y6x8NSGsxeAbPynckM8M71M4ph");

/// Program-derived address seed prefix
pub const TOKEN_SALE: &str = "token_sale";

#[program]
pub mod token_sale {
    use super::*;

    /// Creates the sale record and vault, then deposits `total_deposited`.
    pub fn initialize_token_sale(
        ctx: Context<InitializeTokenSale>,
        total_deposited: u64,
        claim_size: u64,
        fee: u64,
        max_claims: u64,
    ) -> Result<()> {
        require!(total_deposited > 0, TokenSaleError::InvalidParameters);
        require!(claim_size > 0, TokenSaleError::InvalidParameters);
        require!(max_claims > 0, TokenSaleError::InvalidParameters);
        // init_if_needed lets an existing record surface as a collision
        require!(
            ctx.accounts.sale.total_deposited == 0,
            TokenSaleError::AddressCollision
        );
        require!(
            ctx.accounts.initializer_token_account.amount >= total_deposited,
            TokenSaleError::InsufficientFunds
        );

        let sale = &mut ctx.accounts.sale;
        sale.authority = ctx.accounts.initializer.key();
        sale.mint = ctx.accounts.mint.key();
        sale.initializer_token_account = ctx.accounts.initializer_token_account.key();
        sale.vault = ctx.accounts.vault.key();
        sale.total_deposited = total_deposited;
        sale.claim_size = claim_size;
        sale.remaining = total_deposited;
        sale.num_claims = 0;
        sale.max_claims = max_claims;
        sale.fee = fee;
        sale.bump = ctx.bumps.sale;

        token::transfer_checked(
            CpiContext::new(
                ctx.accounts.token_program.to_account_info(),
                TransferChecked {
                    from: ctx.accounts.initializer_token_account.to_account_info(),
                    mint: ctx.accounts.mint.to_account_info(),
                    to: ctx.accounts.vault.to_account_info(),
                    authority: ctx.accounts.initializer.to_account_info(),
                },
            ),
            total_deposited,
            ctx.accounts.mint.decimals,
        )?;

        let sale = &ctx.accounts.sale;
        emit!(SaleEvent {
            authority: sale.authority,
            sale: sale.key(),
            remaining: sale.remaining,
            num_claims: sale.num_claims,
            action: SaleAction::Initialized,
        });
        msg!(
            "token sale initialized: {} units, {} per claim, {} claims",
            total_deposited,
            claim_size,
            max_claims
        );

        Ok(())
    }

    /// Pays the fee to the authority and releases one `claim_size` allocation.
    pub fn sell_tokens(ctx: Context<SellTokens>) -> Result<()> {
        let sale = &ctx.accounts.sale;
        require!(
            sale.num_claims < sale.max_claims,
            TokenSaleError::SaleExhausted
        );
        require!(
            sale.remaining >= sale.claim_size,
            TokenSaleError::InsufficientVaultBalance
        );
        require!(
            ctx.accounts.taker.lamports() >= sale.fee,
            TokenSaleError::InsufficientTakerFunds
        );

        if sale.fee > 0 {
            system_program::transfer(
                CpiContext::new(
                    ctx.accounts.system_program.to_account_info(),
                    system_program::Transfer {
                        from: ctx.accounts.taker.to_account_info(),
                        to: ctx.accounts.initializer.to_account_info(),
                    },
                ),
                sale.fee,
            )?;
        }

        let bump = [sale.bump];
        let signer_seeds: &[&[u8]] = &[TOKEN_SALE.as_bytes(), sale.authority.as_ref(), &bump];
        token::transfer_checked(
            CpiContext::new_with_signer(
                ctx.accounts.token_program.to_account_info(),
                TransferChecked {
                    from: ctx.accounts.vault.to_account_info(),
                    mint: ctx.accounts.mint.to_account_info(),
                    to: ctx.accounts.taker_token_account.to_account_info(),
                    authority: ctx.accounts.sale.to_account_info(),
                },
                &[signer_seeds],
            ),
            sale.claim_size,
            ctx.accounts.mint.decimals,
        )?;

        let sale = &mut ctx.accounts.sale;
        sale.num_claims = sale
            .num_claims
            .checked_add(1)
            .ok_or(TokenSaleError::SaleExhausted)?;
        sale.remaining = sale
            .remaining
            .checked_sub(sale.claim_size)
            .ok_or(TokenSaleError::InsufficientVaultBalance)?;

        emit!(SaleEvent {
            authority: sale.authority,
            sale: sale.key(),
            remaining: sale.remaining,
            num_claims: sale.num_claims,
            action: SaleAction::Claimed,
        });

        Ok(())
    }

    /// Returns the vault balance, then closes the vault and the record.
    pub fn cancel_token_sale(ctx: Context<CancelTokenSale>) -> Result<()> {
        let sale = &ctx.accounts.sale;
        let returned = ctx.accounts.vault.amount;
        let bump = [sale.bump];
        let signer_seeds: &[&[u8]] = &[TOKEN_SALE.as_bytes(), sale.authority.as_ref(), &bump];
        let signer = &[signer_seeds];

        if returned > 0 {
            token::transfer_checked(
                CpiContext::new_with_signer(
                    ctx.accounts.token_program.to_account_info(),
                    TransferChecked {
                        from: ctx.accounts.vault.to_account_info(),
                        mint: ctx.accounts.mint.to_account_info(),
                        to: ctx.accounts.initializer_token_account.to_account_info(),
                        authority: ctx.accounts.sale.to_account_info(),
                    },
                    signer,
                ),
                returned,
                ctx.accounts.mint.decimals,
            )?;
        }

        token::close_account(CpiContext::new_with_signer(
            ctx.accounts.token_program.to_account_info(),
            CloseAccount {
                account: ctx.accounts.vault.to_account_info(),
                destination: ctx.accounts.initializer.to_account_info(),
                authority: ctx.accounts.sale.to_account_info(),
            },
            signer,
        ))?;

        emit!(SaleEvent {
            authority: sale.authority,
            sale: sale.key(),
            remaining: 0,
            num_claims: sale.num_claims,
            action: SaleAction::Cancelled,
        });
        msg!("token sale cancelled: {} units returned", returned);

        Ok(())
    }
}

#[account]
pub struct TokenSale {
    /// The initializer; sole party permitted to cancel
    pub authority: Pubkey,
    /// Mint of the asset being sold
    pub mint: Pubkey,
    /// Initializer's funding account
    pub initializer_token_account: Pubkey,
    /// Token account holding the escrowed asset, owned by this PDA
    pub vault: Pubkey,
    pub total_deposited: u64,
    /// Fixed amount released per claim
    pub claim_size: u64,
    pub remaining: u64,
    pub num_claims: u64,
    pub max_claims: u64,
    /// Lamports paid to the authority per claim
    pub fee: u64,
    pub bump: u8,
}

impl TokenSale {
    pub const LEN: usize = 32 * 4 + 8 * 6 + 1;
}

#[derive(Accounts)]
pub struct InitializeTokenSale<'info> {
    /// Initializer paying for both accounts
    #[account(mut)]
    pub initializer: Signer<'info>,

    pub mint: Account<'info, Mint>,

    #[account(
        mut,
        constraint = initializer_token_account.mint == mint.key() @ TokenSaleError::RecordMismatch,
        constraint = initializer_token_account.owner == initializer.key() @ TokenSaleError::Unauthorized,
    )]
    pub initializer_token_account: Account<'info, TokenAccount>,

    /// PDA holding the sale record.
    #[account(
        init_if_needed,
        payer = initializer,
        space = 8 + TokenSale::LEN,
        seeds = [TOKEN_SALE.as_bytes(), initializer.key().as_ref()],
        bump,
    )]
    pub sale: Account<'info, TokenSale>,

    /// Fresh vault keypair; its token authority is the sale PDA.
    #[account(
        init,
        payer = initializer,
        token::mint = mint,
        token::authority = sale,
    )]
    pub vault: Account<'info, TokenAccount>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct SellTokens<'info> {
    /// Buyer paying the fee
    #[account(mut)]
    pub taker: Signer<'info>,

    /// Fee receiver.
    ///
    /// CHECK: must equal the recorded authority
    #[account(mut, address = sale.authority @ TokenSaleError::RecordMismatch)]
    pub initializer: UncheckedAccount<'info>,

    #[account(
        mut,
        seeds = [TOKEN_SALE.as_bytes(), sale.authority.as_ref()],
        bump = sale.bump,
        has_one = vault @ TokenSaleError::RecordMismatch,
        has_one = mint @ TokenSaleError::RecordMismatch,
    )]
    pub sale: Account<'info, TokenSale>,

    pub mint: Account<'info, Mint>,

    #[account(mut)]
    pub vault: Account<'info, TokenAccount>,

    #[account(
        mut,
        constraint = taker_token_account.mint == sale.mint @ TokenSaleError::RecordMismatch,
        constraint = taker_token_account.key() != vault.key() @ TokenSaleError::RecordMismatch,
    )]
    pub taker_token_account: Account<'info, TokenAccount>,

    pub system_program: Program<'info, System>,
    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct CancelTokenSale<'info> {
    #[account(mut)]
    pub initializer: Signer<'info>,

    /// Closed back to the initializer
    #[account(
        mut,
        close = initializer,
        seeds = [TOKEN_SALE.as_bytes(), sale.authority.as_ref()],
        bump = sale.bump,
        constraint = sale.authority == initializer.key() @ TokenSaleError::Unauthorized,
        has_one = vault @ TokenSaleError::RecordMismatch,
        has_one = mint @ TokenSaleError::RecordMismatch,
    )]
    pub sale: Account<'info, TokenSale>,

    pub mint: Account<'info, Mint>,

    #[account(mut)]
    pub vault: Account<'info, TokenAccount>,

    #[account(
        mut,
        constraint = initializer_token_account.mint == sale.mint @ TokenSaleError::RecordMismatch,
        constraint = initializer_token_account.owner == initializer.key() @ TokenSaleError::RecordMismatch,
    )]
    pub initializer_token_account: Account<'info, TokenAccount>,

    pub token_program: Program<'info, Token>,
}

/// Events emitted by the token sale program
#[event]
pub struct SaleEvent {
    pub authority: Pubkey,
    pub sale: Pubkey,
    pub remaining: u64,
    pub num_claims: u64,
    pub action: SaleAction,
}

/// Token sale lifecycle actions
#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub enum SaleAction {
    Initialized,
    Claimed,
    Cancelled,
}

#[error_code]
pub enum TokenSaleError {
    #[msg("A token sale already exists for this initializer.")]
    AddressCollision,
    #[msg("Amounts must be positive.")]
    InvalidParameters,
    #[msg("Funding account balance is too low.")]
    InsufficientFunds,
    #[msg("All of the tokens have been claimed!")]
    SaleExhausted,
    #[msg("Vault holds less than one claim.")]
    InsufficientVaultBalance,
    #[msg("Taker cannot cover the fee.")]
    InsufficientTakerFunds,
    #[msg("Accounts do not match the token sale record.")]
    RecordMismatch,
    #[msg("Only the sale authority may do this.")]
    Unauthorized,
}
