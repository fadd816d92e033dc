//! A small bank-account domain shared by tests across the workspace.

use eventloom_core::aggregate::AggregateId;
use eventloom_core::builder::AggregateBuilder;
use eventloom_core::domain_events;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opened {
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposited {
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawn {
    pub amount: i64,
}

domain_events! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum AccountEvent {
        Opened(Opened) => "account.opened",
        Deposited(Deposited) => "account.deposited",
        Withdrawn(Withdrawn) => "account.withdrawn",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub owner: String,
    pub balance: i64,
}

/// Builder with an applier for every account event and two rules: an owner
/// is required and the balance must not go negative.
pub fn account_builder<Id: AggregateId, C: 'static>() -> AggregateBuilder<Account, Id, AccountEvent, C>
{
    AggregateBuilder::new(|_: &Id| Account::default())
        .with_applier(|account: &mut Account, e: &Opened| account.owner.clone_from(&e.owner))
        .with_applier(|account: &mut Account, e: &Deposited| account.balance += e.amount)
        .with_applier(|account: &mut Account, e: &Withdrawn| account.balance -= e.amount)
        .with_rule(|account| !account.owner.is_empty(), "Owner required")
        .with_rule(|account| account.balance >= 0, "Balance must not be negative")
}

#[must_use]
pub fn opened(owner: &str) -> AccountEvent {
    AccountEvent::Opened(Opened {
        owner: owner.to_owned(),
    })
}

#[must_use]
pub fn deposited(amount: i64) -> AccountEvent {
    AccountEvent::Deposited(Deposited { amount })
}

#[must_use]
pub fn withdrawn(amount: i64) -> AccountEvent {
    AccountEvent::Withdrawn(Withdrawn { amount })
}
