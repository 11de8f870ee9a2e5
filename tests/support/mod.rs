//! Shared fixtures for the integration suites.

#![allow(dead_code)]

mod gated;

use chrono::NaiveDate;
use optimistic_ledger::{
    CacheConfig, InMemoryBackend, LedgerClient, NewObligation, NewPayment, ObligationKind,
};
use rust_decimal::Decimal;
use std::sync::Arc;

pub use gated::{Gate, GatedBackend};

/// Install a test-writer subscriber once; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

pub fn money(amount: i64) -> Decimal {
    Decimal::from(amount)
}

pub fn obligation(counterparty: &str, amount: i64) -> NewObligation {
    NewObligation::new(counterparty, money(amount), date(1, 15))
}

pub fn payment(amount: i64) -> NewPayment {
    NewPayment::new(money(amount), date(2, 1))
}

pub const DEBT: ObligationKind = ObligationKind::Debt;

pub fn client(backend: InMemoryBackend) -> LedgerClient<InMemoryBackend> {
    init_tracing();
    LedgerClient::new(backend, CacheConfig::default())
}

pub fn gated_client(backend: &GatedBackend) -> LedgerClient<GatedBackend> {
    init_tracing();
    LedgerClient::with_cache(
        Arc::new(backend.clone()),
        optimistic_ledger::QueryCache::new(CacheConfig::default()),
    )
}

/// Let every ready task on the current-thread runtime run.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
