//! Shared fixtures for the backend integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use ledger_server::{
    error::{AppError, AppResult},
    external::{IdentityDirectory, PartyDirectory, PartyProfile, UserProfile},
    services::{CheckService, DocumentService, StockService},
    store::{MemoryLedgerStore, StoreRef},
    AppState, Config,
};
use rust_decimal::Decimal;
use shared::{CheckInput, CheckLineInput, CounterpartyRole, DocumentInput, LineInput, StockUpsert};

pub const MAIN_STORE: i64 = 1;
pub const BRANCH_STORE: i64 = 2;
pub const SUPPLIER: i64 = 100;
pub const CUSTOMER: i64 = 200;
pub const CLERK: i64 = 7;
pub const MANAGER: i64 = 8;

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Identity service double with two known users
pub struct StaticIdentity {
    users: HashMap<i64, UserProfile>,
}

impl StaticIdentity {
    pub fn new() -> Self {
        let users = [(CLERK, "Ann Clerk", "STAFF"), (MANAGER, "Bo Manager", "MANAGER")]
            .into_iter()
            .map(|(id, name, role)| {
                (
                    id,
                    UserProfile {
                        id,
                        full_name: Some(name.to_string()),
                        role: Some(role.to_string()),
                    },
                )
            })
            .collect();
        Self { users }
    }
}

#[async_trait]
impl IdentityDirectory for StaticIdentity {
    async fn users_by_ids(&self, ids: &[i64]) -> AppResult<HashMap<i64, UserProfile>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.users.get(id))
            .map(|u| (u.id, u.clone()))
            .collect())
    }
}

/// Master data double; `failing` simulates an unreachable service
pub struct StaticParties {
    failing: bool,
}

impl StaticParties {
    pub fn new() -> Self {
        Self { failing: false }
    }

    pub fn failing() -> Self {
        Self { failing: true }
    }
}

#[async_trait]
impl PartyDirectory for StaticParties {
    async fn parties_by_ids(
        &self,
        role: CounterpartyRole,
        ids: &[i64],
    ) -> AppResult<HashMap<i64, PartyProfile>> {
        if self.failing {
            return Err(AppError::ExternalService("master data unavailable".to_string()));
        }
        let (known, name, code) = match role {
            CounterpartyRole::Supplier => (SUPPLIER, "Acme Supplies", "SUP-1"),
            CounterpartyRole::Customer => (CUSTOMER, "Registered Customer", "CUS-1"),
        };
        Ok(ids
            .iter()
            .filter(|id| **id == known)
            .map(|id| {
                (
                    *id,
                    PartyProfile {
                        id: *id,
                        name: Some(name.to_string()),
                        code: Some(code.to_string()),
                        phone: Some("0800".to_string()),
                        address: Some("1 Market St".to_string()),
                    },
                )
            })
            .collect())
    }
}

/// In-memory application wiring
pub struct Harness {
    pub store: Arc<MemoryLedgerStore>,
    pub state: AppState,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_parties(StaticParties::new())
    }

    pub fn with_parties(parties: StaticParties) -> Self {
        let store = Arc::new(MemoryLedgerStore::new());
        for (id, code, name) in [(MAIN_STORE, "WH-01", "Main"), (BRANCH_STORE, "WH-02", "Branch")] {
            store
                .register_store(StoreRef {
                    id,
                    code: code.to_string(),
                    name: name.to_string(),
                })
                .unwrap();
        }

        let state = AppState {
            store: store.clone(),
            identity: Arc::new(StaticIdentity::new()),
            parties: Arc::new(parties),
            config: Arc::new(Config::default()),
        };
        Self { store, state }
    }

    pub fn documents(&self) -> DocumentService {
        self.state.documents()
    }

    pub fn checks(&self) -> CheckService {
        self.state.checks()
    }

    pub fn stock(&self) -> StockService {
        self.state.stock()
    }

    /// Set the quantity of a stock entry directly
    pub async fn seed_stock(&self, product_id: i64, store_id: i64, quantity: i64) {
        self.stock()
            .create_or_update(StockUpsert {
                product_id,
                store_id,
                quantity: Some(quantity),
                min_stock: None,
                max_stock: None,
            })
            .await
            .unwrap();
    }

    pub async fn quantity(&self, product_id: i64, store_id: i64) -> i64 {
        self.stock().get(product_id, store_id).await.unwrap().quantity
    }
}

pub fn line(product_id: i64, quantity: i64, unit_price: &str, discount: Option<&str>) -> LineInput {
    LineInput {
        product_id: Some(product_id),
        store_id: Some(MAIN_STORE),
        quantity: Some(quantity),
        unit_price: Some(dec(unit_price)),
        discount_percent: discount.map(dec),
    }
}

pub fn import_input(items: Vec<LineInput>) -> DocumentInput {
    DocumentInput {
        store_id: Some(MAIN_STORE),
        counterparty_id: Some(SUPPLIER),
        items,
        ..Default::default()
    }
}

pub fn export_input(items: Vec<LineInput>) -> DocumentInput {
    DocumentInput {
        store_id: Some(MAIN_STORE),
        counterparty_name: Some("Walk-in Customer".to_string()),
        items,
        ..Default::default()
    }
}

/// Counted row at the main store
pub fn counted(product_id: i64, system: i64, actual: i64, unit_price: Option<&str>) -> CheckLineInput {
    CheckLineInput {
        product_id: Some(product_id),
        store_id: Some(MAIN_STORE),
        system_quantity: Some(system),
        actual_quantity: Some(actual),
        unit_price: unit_price.map(dec),
        note: None,
    }
}

pub fn check_input(items: Vec<CheckLineInput>) -> CheckInput {
    CheckInput {
        store_id: Some(MAIN_STORE),
        items,
        ..Default::default()
    }
}
