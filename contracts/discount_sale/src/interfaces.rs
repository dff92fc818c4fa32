use soroban_sdk::{contractclient, contracttype, Address, Env};

/// A push feed reading together with the feed's own freshness metadata.
#[derive(Clone, Debug, Eq, PartialEq)]
#[contracttype]
pub struct PriceData {
    pub value: i128,
    pub updated_at: u64,
}

/// A balance locked in the voting escrow until `unlock_time`.
/// `unlock_time` always sits on a week boundary; a lock with
/// `unlock_time <= now` is expired.
#[derive(Clone, Debug, Eq, PartialEq)]
#[contracttype]
pub struct LockedBalance {
    pub amount: i128,
    pub unlock_time: u64,
}

/// Push-based price feed (e.g. a Chainlink-style aggregator). Reports its
/// last update time so callers can judge staleness themselves.
#[contractclient(name = "PushFeedClient")]
pub trait PushFeed {
    fn latest_price(env: Env) -> PriceData;
}

/// Pull-based price feed (e.g. an AMM price oracle). No staleness metadata;
/// trusted as always current.
#[contractclient(name = "PullFeedClient")]
pub trait PullFeed {
    fn instant_price(env: Env) -> i128;
}

/// The vote-escrow contract holding locked sale-token balances.
#[contractclient(name = "VotingEscrowClient")]
pub trait VotingEscrow {
    fn lock_of(env: Env, account: Address) -> LockedBalance;
    fn extend_lock(
        env: Env,
        account: Address,
        additional_amount: i128,
        new_unlock_time: Option<u64>,
    );
}

/// Optional post-purchase hook. Invoked inside the buy transaction, so a
/// failing callback aborts the whole purchase.
#[contractclient(name = "BuyCallbackClient")]
pub trait BuyCallback {
    fn on_buy(env: Env, beneficiary: Address, buyer: Address, spend: i128, amount: i128);
}
