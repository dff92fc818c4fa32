#![no_std]

//! Discounted sale of the governance token against a vote-escrow lock.
//!
//! Buyers pay in the settlement token and receive governance tokens at a
//! discount derived from their (or their beneficiary's) existing escrow lock
//! duration. Access is gated by a two-tier, time-expiring allowance ledger:
//! management grants monthly budgets to team accounts, teams delegate slices
//! of their budget to contributors, and contributors spend theirs in `buy`.
//! Purchased tokens are locked straight into the escrow on behalf of the
//! beneficiary.

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, symbol_short, token, Address, Env, Vec,
};

pub mod curve;
pub mod interfaces;

use curve::DISCOUNT_SCALE;
use interfaces::{BuyCallbackClient, PullFeedClient, PushFeedClient, VotingEscrowClient};

/// Allowance grants lapse this long after being set (one epoch).
pub const ALLOWANCE_EXPIRATION_TIME: u64 = 30 * 24 * 60 * 60;

/// Push feed readings older than this are stale.
pub const STALENESS_WINDOW: u64 = 60 * 60;

/// Prices are quoted as settlement units per sale token, scaled by 1e18.
pub const PRICE_SCALE: i128 = 1_000_000_000_000_000_000;

#[contract]
pub struct DiscountSale;

/// Logical current value of an allowance as reported to callers: the budget
/// still spendable and the timestamp at which it lapses. Entries read at or
/// past their expiration report `(0, 0)` without any storage write.
#[derive(Clone, Debug, Eq, PartialEq)]
#[contracttype]
pub struct Allowance {
    pub budget: i128,
    pub expiration: u64,
}

/// Team-level budget. `allocated` is the sum of the team's currently
/// attributed contributor grants; `allocated <= budget` holds after every
/// mutation.
#[derive(Clone)]
#[contracttype]
struct TeamEntry {
    budget: i128,
    allocated: i128,
    expiration: u64,
}

/// Attribution record for a single (team, contributor) grant. Used for
/// replace semantics and team capacity bookkeeping; not reduced by spending.
#[derive(Clone)]
#[contracttype]
struct GrantEntry {
    amount: i128,
    expiration: u64,
}

#[derive(Clone)]
#[contracttype]
enum DataKey {
    Management,
    /// Recipient of settlement funds from every buy.
    Treasury,
    /// Governance token being sold; the contract's own balance is the
    /// sale inventory.
    SaleToken,
    /// Settlement currency buyers pay with.
    PaymentToken,
    Escrow,
    PushFeed,
    /// Absent in the single-feed oracle shape.
    PullFeed,
    Team(Address),
    /// Pooled spendable budget per contributor.
    Contributor(Address),
    Grant(Address, Address),
}

#[contracterror]
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[repr(u32)]
pub enum Error {
    NotInitialized = 1,
    AlreadyInitialized = 2,
    Unauthorized = 3,
    /// Non-positive amount, or mismatched account/budget vector lengths.
    InvalidAmount = 4,
    /// A required feed reported a missing or non-positive price.
    OracleError = 5,
    /// Single-feed shape only: the push feed is past the staleness window.
    StaleOracle = 6,
    /// Beneficiary has no lock, or the lock has already expired.
    NoLock = 7,
    LockTooShort = 8,
    DelegateLockTooShort = 9,
    /// The relevant allowance rolled to a new epoch with no fresh grant.
    AllowanceExpired = 10,
    InsufficientAllowance = 11,
    /// Requested contributor budgets exceed the team's remaining budget.
    ExcessAllowance = 12,
    /// Slippage guard: computed amount fell below the caller's minimum.
    PriceChange = 13,
    /// The contract holds fewer sale tokens than the buy requires.
    InsufficientFunding = 14,
    MathOverflow = 15,
}

fn read_address(env: &Env, key: DataKey) -> Result<Address, Error> {
    env.storage().instance().get(&key).ok_or(Error::NotInitialized)
}

fn require_management_auth(env: &Env) -> Result<(), Error> {
    let management = read_address(env, DataKey::Management)?;
    management.require_auth();
    Ok(())
}

fn read_team(env: &Env, account: &Address) -> Option<TeamEntry> {
    env.storage().instance().get(&DataKey::Team(account.clone()))
}

fn write_team(env: &Env, account: &Address, entry: &TeamEntry) {
    env.storage().instance().set(&DataKey::Team(account.clone()), entry);
}

fn read_pot(env: &Env, contributor: &Address) -> Option<Allowance> {
    env.storage().instance().get(&DataKey::Contributor(contributor.clone()))
}

fn write_pot(env: &Env, contributor: &Address, pot: &Allowance) {
    env.storage().instance().set(&DataKey::Contributor(contributor.clone()), pot);
}

/// Current unit price of the sale token in settlement terms, scaled by
/// [`PRICE_SCALE`]. Read-only; truncating arithmetic only.
fn resolve_spot_price(env: &Env) -> Result<i128, Error> {
    let push_feed = read_address(env, DataKey::PushFeed)?;
    let reading = PushFeedClient::new(env, &push_feed).latest_price();
    let now = env.ledger().timestamp();
    let fresh = now.saturating_sub(reading.updated_at) <= STALENESS_WINDOW;

    let pull_feed: Option<Address> = env.storage().instance().get(&DataKey::PullFeed);
    match pull_feed {
        // Single composite feed: staleness is fatal.
        None => {
            if !fresh {
                return Err(Error::StaleOracle);
            }
            if reading.value <= 0 {
                return Err(Error::OracleError);
            }
            Ok(reading.value)
        }
        // Dual feed: take the max of the valid readings. A stale push feed
        // is excluded without error; the pull feed is always required.
        Some(pull_feed) => {
            let pull_price = PullFeedClient::new(env, &pull_feed).instant_price();
            if pull_price <= 0 {
                return Err(Error::OracleError);
            }
            let mut price = pull_price;
            if fresh && reading.value > price {
                price = reading.value;
            }
            Ok(price)
        }
    }
}

/// Verify the beneficiary's lock clears the minimum-duration gate and return
/// its remaining whole weeks. Missing and expired locks fail identically.
fn check_lock(env: &Env, beneficiary: &Address, delegated: bool) -> Result<u64, Error> {
    let escrow = read_address(env, DataKey::Escrow)?;
    let lock = VotingEscrowClient::new(env, &escrow).lock_of(beneficiary);
    let now = env.ledger().timestamp();
    if lock.amount <= 0 || lock.unlock_time <= now {
        return Err(Error::NoLock);
    }
    let weeks = curve::remaining_weeks(lock.unlock_time, now);
    if weeks < curve::min_lock_weeks(delegated) {
        return Err(if delegated {
            Error::DelegateLockTooShort
        } else {
            Error::LockTooShort
        });
    }
    Ok(weeks)
}

/// Tokens released for `spend` at `price` with `fraction` discount:
/// `spend / (price * (SCALE - fraction) / SCALE)`, truncating throughout.
fn compute_amount(spend: i128, price: i128, fraction: i128) -> Result<i128, Error> {
    let discounted = price
        .checked_mul(DISCOUNT_SCALE - fraction)
        .ok_or(Error::MathOverflow)?
        / DISCOUNT_SCALE;
    if discounted <= 0 {
        return Err(Error::OracleError);
    }
    spend
        .checked_mul(PRICE_SCALE)
        .ok_or(Error::MathOverflow)
        .map(|scaled| scaled / discounted)
}

#[contractimpl]
impl DiscountSale {
    /// One-shot configuration. `pull_feed` selects the oracle shape for the
    /// life of the contract: `None` for a single staleness-checked push feed,
    /// `Some` for dual-feed max with graceful staleness degradation.
    pub fn initialize(
        env: Env,
        management: Address,
        treasury: Address,
        sale_token: Address,
        payment_token: Address,
        escrow: Address,
        push_feed: Address,
        pull_feed: Option<Address>,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Management) {
            return Err(Error::AlreadyInitialized);
        }
        management.require_auth();
        env.storage().instance().set(&DataKey::Management, &management);
        env.storage().instance().set(&DataKey::Treasury, &treasury);
        env.storage().instance().set(&DataKey::SaleToken, &sale_token);
        env.storage().instance().set(&DataKey::PaymentToken, &payment_token);
        env.storage().instance().set(&DataKey::Escrow, &escrow);
        env.storage().instance().set(&DataKey::PushFeed, &push_feed);
        if let Some(pull_feed) = pull_feed {
            env.storage().instance().set(&DataKey::PullFeed, &pull_feed);
        }
        Ok(())
    }

    pub fn spot_price(env: Env) -> Result<i128, Error> {
        resolve_spot_price(&env)
    }

    /// Discount fraction over `DISCOUNT_SCALE` for `account`'s current lock.
    /// Zero when the account has no lock or the lock has expired.
    pub fn discount(env: Env, account: Address) -> Result<i128, Error> {
        let escrow = read_address(&env, DataKey::Escrow)?;
        let lock = VotingEscrowClient::new(&env, &escrow).lock_of(&account);
        let now = env.ledger().timestamp();
        if lock.amount <= 0 || lock.unlock_time <= now {
            return Ok(0);
        }
        Ok(curve::discount_fraction(curve::remaining_weeks(lock.unlock_time, now)))
    }

    /// Whether `account`'s lock clears the minimum duration for a buy.
    pub fn min_lock(env: Env, account: Address, is_delegated: bool) -> Result<bool, Error> {
        match check_lock(&env, &account, is_delegated) {
            Ok(_) => Ok(true),
            Err(Error::NoLock)
            | Err(Error::LockTooShort)
            | Err(Error::DelegateLockTooShort) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Tokens a buy of `spend` would release for `account` right now. Fails
    /// exactly where `buy` would fail on the lock or oracle.
    pub fn preview(
        env: Env,
        account: Address,
        spend: i128,
        is_delegated: bool,
    ) -> Result<i128, Error> {
        if spend <= 0 {
            return Err(Error::InvalidAmount);
        }
        let weeks = check_lock(&env, &account, is_delegated)?;
        let price = resolve_spot_price(&env)?;
        compute_amount(spend, price, curve::discount_fraction(weeks))
    }

    /// Overwrite team budgets, stamped to expire one epoch from now (or at
    /// `expiration` when given). Overwriting resets the team's delegation
    /// bookkeeping along with its budget. Management only.
    pub fn set_team_allowances(
        env: Env,
        accounts: Vec<Address>,
        budgets: Vec<i128>,
        expiration: Option<u64>,
    ) -> Result<(), Error> {
        require_management_auth(&env)?;
        if accounts.len() != budgets.len() {
            return Err(Error::InvalidAmount);
        }
        let now = env.ledger().timestamp();
        let expiration = expiration.unwrap_or(now + ALLOWANCE_EXPIRATION_TIME);
        for (account, budget) in accounts.iter().zip(budgets.iter()) {
            if budget < 0 {
                return Err(Error::InvalidAmount);
            }
            let entry = TeamEntry {
                budget,
                allocated: 0,
                expiration,
            };
            write_team(&env, &account, &entry);
            env.events()
                .publish((symbol_short!("teamset"), account), (budget, expiration));
        }
        Ok(())
    }

    /// Delegate slices of the calling team's budget to contributors. A grant
    /// for a contributor the team already granted in the current epoch
    /// replaces the prior allocation rather than adding to it; the team's
    /// remaining capacity is `budget - sum(current grants)` at all times.
    pub fn set_contributor_allowances(
        env: Env,
        team: Address,
        contributors: Vec<Address>,
        budgets: Vec<i128>,
    ) -> Result<(), Error> {
        team.require_auth();
        if contributors.len() != budgets.len() {
            return Err(Error::InvalidAmount);
        }
        let mut entry = read_team(&env, &team).ok_or(Error::Unauthorized)?;
        let now = env.ledger().timestamp();
        if now >= entry.expiration {
            return Err(Error::AllowanceExpired);
        }
        for (contributor, budget) in contributors.iter().zip(budgets.iter()) {
            if budget < 0 {
                return Err(Error::InvalidAmount);
            }
            let grant_key = DataKey::Grant(team.clone(), contributor.clone());
            let prior: Option<GrantEntry> = env.storage().instance().get(&grant_key);
            // Attribution against the team's current epoch only.
            let prior_attributed = prior
                .as_ref()
                .filter(|grant| grant.expiration == entry.expiration)
                .map(|grant| grant.amount)
                .unwrap_or(0);
            // Any still-live prior grant from this team is withdrawn from the
            // contributor's pot when replaced, whichever epoch stamped it.
            let prior_live = prior
                .as_ref()
                .filter(|grant| grant.expiration > now)
                .map(|grant| grant.amount)
                .unwrap_or(0);

            entry.allocated = entry
                .allocated
                .checked_sub(prior_attributed)
                .and_then(|allocated| allocated.checked_add(budget))
                .ok_or(Error::MathOverflow)?;
            if entry.allocated > entry.budget {
                return Err(Error::ExcessAllowance);
            }

            let base = read_pot(&env, &contributor)
                .filter(|pot| now < pot.expiration)
                .map(|pot| pot.budget)
                .unwrap_or(0);
            // The pot is restamped to the granting team's window; a team
            // with a shorter window shortens any still-live budget other
            // teams contributed to the same pot.
            let pot = Allowance {
                budget: (base - prior_live + budget).max(0),
                expiration: entry.expiration,
            };
            write_pot(&env, &contributor, &pot);
            env.storage().instance().set(
                &grant_key,
                &GrantEntry {
                    amount: budget,
                    expiration: entry.expiration,
                },
            );
            env.events().publish(
                (symbol_short!("contrib"), team.clone(), contributor),
                (budget, entry.expiration),
            );
        }
        write_team(&env, &team, &entry);
        Ok(())
    }

    /// Remaining team budget and its expiration; `(0, 0)` once expired.
    pub fn team_allowance(env: Env, account: Address) -> Allowance {
        let now = env.ledger().timestamp();
        match read_team(&env, &account) {
            Some(entry) if now < entry.expiration => Allowance {
                budget: entry.budget - entry.allocated,
                expiration: entry.expiration,
            },
            _ => Allowance {
                budget: 0,
                expiration: 0,
            },
        }
    }

    /// Contributor's spendable budget and its expiration; `(0, 0)` once
    /// expired.
    pub fn contributor_allowance(env: Env, contributor: Address) -> Allowance {
        let now = env.ledger().timestamp();
        match read_pot(&env, &contributor) {
            Some(pot) if now < pot.expiration => pot,
            _ => Allowance {
                budget: 0,
                expiration: 0,
            },
        }
    }

    /// Spend `spend` settlement tokens from the buyer's contributor allowance
    /// and lock the discounted token amount into the escrow for the
    /// beneficiary (the buyer, unless delegated). All steps commit together
    /// or not at all; the callback, when given, runs inside that boundary.
    pub fn buy(
        env: Env,
        buyer: Address,
        spend: i128,
        min_amount: i128,
        beneficiary: Option<Address>,
        callback: Option<Address>,
    ) -> Result<i128, Error> {
        buyer.require_auth();
        if spend <= 0 {
            return Err(Error::InvalidAmount);
        }
        let beneficiary = beneficiary.unwrap_or_else(|| buyer.clone());
        let delegated = beneficiary != buyer;
        let now = env.ledger().timestamp();

        let weeks = check_lock(&env, &beneficiary, delegated)?;

        let pot = match read_pot(&env, &buyer) {
            Some(pot) if now >= pot.expiration => return Err(Error::AllowanceExpired),
            Some(pot) => pot,
            // Never granted: the logical budget is zero, not lapsed.
            None => Allowance {
                budget: 0,
                expiration: 0,
            },
        };
        if pot.budget < spend {
            return Err(Error::InsufficientAllowance);
        }

        let price = resolve_spot_price(&env)?;
        let amount = compute_amount(spend, price, curve::discount_fraction(weeks))?;
        if amount < min_amount {
            return Err(Error::PriceChange);
        }

        let contract = env.current_contract_address();
        let sale_token = token::Client::new(&env, &read_address(&env, DataKey::SaleToken)?);
        if sale_token.balance(&contract) < amount {
            return Err(Error::InsufficientFunding);
        }

        // All checks passed; apply the staged mutations.
        write_pot(
            &env,
            &buyer,
            &Allowance {
                budget: pot.budget - spend,
                expiration: pot.expiration,
            },
        );
        let payment_token = token::Client::new(&env, &read_address(&env, DataKey::PaymentToken)?);
        payment_token.transfer(&buyer, &read_address(&env, DataKey::Treasury)?, &spend);

        let escrow = read_address(&env, DataKey::Escrow)?;
        sale_token.transfer(&contract, &escrow, &amount);
        VotingEscrowClient::new(&env, &escrow).extend_lock(&beneficiary, &amount, &None);

        env.events().publish(
            (symbol_short!("buy"), beneficiary.clone()),
            (buyer.clone(), spend, amount),
        );

        if let Some(callback) = callback {
            BuyCallbackClient::new(&env, &callback).on_buy(&beneficiary, &buyer, &spend, &amount);
        }
        Ok(amount)
    }

    /// Pull tokens held by the contract (e.g. unsold sale inventory) back
    /// out. Management only.
    pub fn sweep(env: Env, token_address: Address, amount: i128, to: Address) -> Result<(), Error> {
        require_management_auth(&env)?;
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }
        let contract = env.current_contract_address();
        let client = token::Client::new(&env, &token_address);
        if client.balance(&contract) < amount {
            return Err(Error::InsufficientFunding);
        }
        client.transfer(&contract, &to, &amount);
        Ok(())
    }
}
