//! Contract of the remote data service the engine synchronizes with.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::{Error, RemoteError, ValidationError};
use crate::offline::{
    Record, BEATS_STORE, BEAT_PLANS_STORE, CATEGORIES_STORE, COMPETITION_DATA_STORE, ORDERS_STORE,
    PRODUCTS_STORE, PRODUCT_VARIANTS_STORE, RETAILERS_STORE, SCHEMES_STORE, VISITS_STORE,
};
use crate::sync::SyncAction;

/// How a category's delta query is scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Global,
    User,
    UserDate,
}

/// Data categories exposed by the remote delta query, one per local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    Products,
    ProductVariants,
    Schemes,
    Categories,
    Beats,
    Retailers,
    BeatPlans,
    CompetitionData,
    Visits,
    Orders,
}

impl DataCategory {
    pub const ALL: [DataCategory; 10] = [
        Self::Products,
        Self::ProductVariants,
        Self::Schemes,
        Self::Categories,
        Self::Beats,
        Self::Retailers,
        Self::BeatPlans,
        Self::CompetitionData,
        Self::Visits,
        Self::Orders,
    ];

    /// Wire name, identical to the local store name.
    pub fn as_str(&self) -> &'static str {
        self.store()
    }

    pub fn store(&self) -> &'static str {
        match self {
            Self::Products => PRODUCTS_STORE,
            Self::ProductVariants => PRODUCT_VARIANTS_STORE,
            Self::Schemes => SCHEMES_STORE,
            Self::Categories => CATEGORIES_STORE,
            Self::Beats => BEATS_STORE,
            Self::Retailers => RETAILERS_STORE,
            Self::BeatPlans => BEAT_PLANS_STORE,
            Self::CompetitionData => COMPETITION_DATA_STORE,
            Self::Visits => VISITS_STORE,
            Self::Orders => ORDERS_STORE,
        }
    }

    pub fn scope_kind(&self) -> ScopeKind {
        match self {
            Self::Products
            | Self::ProductVariants
            | Self::Schemes
            | Self::Categories
            | Self::CompetitionData => ScopeKind::Global,
            Self::Beats | Self::Retailers | Self::BeatPlans => ScopeKind::User,
            Self::Visits | Self::Orders => ScopeKind::UserDate,
        }
    }
}

impl FromStr for DataCategory {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
            .ok_or_else(|| Error::Validation(ValidationError::UnknownStore(value.to_string())))
    }
}

/// User and day a fetch is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchScope {
    pub user_id: Option<String>,
    pub date: Option<String>,
}

impl FetchScope {
    pub fn new(user_id: Option<String>, date: Option<String>) -> Self {
        Self { user_id, date }
    }

    /// Narrow to the parts the category is scoped by.
    pub fn for_category(&self, category: DataCategory) -> FetchScope {
        match category.scope_kind() {
            ScopeKind::Global => FetchScope::default(),
            ScopeKind::User => FetchScope {
                user_id: self.user_id.clone(),
                date: None,
            },
            ScopeKind::UserDate => self.clone(),
        }
    }
}

/// Remote data service.
///
/// Upserts and deletes must be idempotent per `idempotency_key`: the engine
/// delivers queued mutations at least once.
#[async_trait]
pub trait RemoteDataService: Send + Sync {
    /// Records of `category` changed since `since` (everything when `None`).
    async fn fetch_changes(
        &self,
        category: DataCategory,
        scope: &FetchScope,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Record>, RemoteError>;

    async fn upsert_record(
        &self,
        store: &str,
        record: &Record,
        idempotency_key: &str,
    ) -> Result<(), RemoteError>;

    async fn delete_record(
        &self,
        store: &str,
        id: &str,
        idempotency_key: &str,
    ) -> Result<(), RemoteError>;
}

/// Submit one decoded mutation.
pub async fn apply_action(
    service: &dyn RemoteDataService,
    action: &SyncAction,
    idempotency_key: &str,
) -> Result<(), RemoteError> {
    match action.to_record() {
        Ok(Some(record)) => {
            service
                .upsert_record(action.store(), &record, idempotency_key)
                .await
        }
        Ok(None) => {
            service
                .delete_record(action.store(), action.entity_id(), idempotency_key)
                .await
        }
        Err(err) => Err(RemoteError::InvalidRequest(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_map_one_to_one_onto_stores() {
        let stores: Vec<&str> = DataCategory::ALL.iter().map(|c| c.store()).collect();
        assert_eq!(stores, crate::offline::OFFLINE_STORES.to_vec());
        assert_eq!(
            "beat_plans".parse::<DataCategory>().expect("parse"),
            DataCategory::BeatPlans
        );
        assert!("invoices".parse::<DataCategory>().is_err());
    }

    #[test]
    fn scope_narrows_by_category() {
        let scope = FetchScope::new(Some("u1".to_string()), Some("2026-10-16".to_string()));
        assert_eq!(scope.for_category(DataCategory::Products), FetchScope::default());
        assert_eq!(
            scope.for_category(DataCategory::Retailers),
            FetchScope::new(Some("u1".to_string()), None)
        );
        assert_eq!(scope.for_category(DataCategory::Visits), scope);
    }
}
