//! # Query & Filter Engine
//!
//! Filters, sorts and paginates deployments, and computes dashboard
//! statistics. Everything time-dependent (overdue, days until due) is
//! derived from the `now` argument on every call; nothing is cached.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use depot_core::{Priority, TellerId, Timestamp, UserId};
use depot_state::{Deployment, DeploymentStatus, ReturnStatus};

/// Default page size.
pub const DEFAULT_LIMIT: usize = 50;
/// Largest accepted page size.
pub const MAX_LIMIT: usize = 500;

/// Field to sort by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    CreatedAt,
    ExpectedReturnDate,
    ItemName,
    Priority,
}

impl SortField {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "createdAt" => Some(Self::CreatedAt),
            "expectedReturnDate" => Some(Self::ExpectedReturnDate),
            "itemName" => Some(Self::ItemName),
            "priority" => Some(Self::Priority),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Filters, ordering and paging for a deployment listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentQuery {
    /// Case-insensitive substring over item name, description, notes and
    /// teller names.
    pub search: Option<String>,
    pub status: Option<DeploymentStatus>,
    pub priority: Option<Priority>,
    pub teller_id: Option<TellerId>,
    pub declarator_id: Option<UserId>,
    /// Inclusive lower bound on `createdAt`.
    pub date_from: Option<Timestamp>,
    /// Inclusive upper bound on `createdAt`.
    pub date_to: Option<Timestamp>,
    /// `Some(true)` keeps only overdue deployments, `Some(false)` only the
    /// rest.
    pub overdue: Option<bool>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

/// A deployment plus the fields derived from the clock at read time.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentView {
    #[serde(flatten)]
    pub deployment: Deployment,
    pub is_overdue: bool,
    pub days_overdue: i64,
    pub days_until_due: i64,
    pub return_status: ReturnStatus,
    pub all_tellers_complete: bool,
    pub assets_settled: usize,
    pub assets_total: usize,
}

impl DeploymentView {
    pub fn at(deployment: Deployment, now: Timestamp) -> Self {
        Self {
            is_overdue: deployment.is_overdue(now),
            days_overdue: deployment.days_overdue(now),
            days_until_due: deployment.days_until_due(now),
            return_status: deployment.return_status(now),
            all_tellers_complete: deployment.all_tellers_complete(),
            assets_settled: deployment.assets_settled(),
            assets_total: deployment.assets.len(),
            deployment,
        }
    }
}

/// Dashboard counters, recomputed from scratch on every call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStats {
    /// Deployments currently in the field.
    pub total_deployed: usize,
    pub total_returned: usize,
    pub overdue: usize,
    /// Deployments whose tellers are not all complete.
    pub pending_completion: usize,
    pub urgent: usize,
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub deployments: Vec<DeploymentView>,
    /// Statistics over every match, not only this page.
    pub stats: DeploymentStats,
    /// Matches before pagination.
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

/// Filter, sort and paginate.
pub fn list(deployments: Vec<Deployment>, query: &DeploymentQuery, now: Timestamp) -> QueryResult {
    let matches = filter_sorted(deployments, query, now);
    let stats = compute_stats(&matches, now);
    let total = matches.len();
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let deployments = matches
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .map(|d| DeploymentView::at(d, now))
        .collect();
    QueryResult {
        deployments,
        stats,
        total,
        page,
        limit,
    }
}

/// Every match in order, without pagination.
pub fn filter_sorted(
    deployments: Vec<Deployment>,
    query: &DeploymentQuery,
    now: Timestamp,
) -> Vec<Deployment> {
    let needle = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut matches: Vec<Deployment> = deployments
        .into_iter()
        .filter(|d| query.status.map_or(true, |s| d.status == s))
        .filter(|d| query.priority.map_or(true, |p| d.priority == p))
        .filter(|d| query.teller_id.as_ref().map_or(true, |t| d.is_assigned(t)))
        .filter(|d| {
            query
                .declarator_id
                .as_ref()
                .map_or(true, |u| &d.declarator_id == u)
        })
        .filter(|d| query.date_from.map_or(true, |from| d.created_at >= from))
        .filter(|d| query.date_to.map_or(true, |to| d.created_at <= to))
        .filter(|d| query.overdue.map_or(true, |o| d.is_overdue(now) == o))
        .filter(|d| needle.as_deref().map_or(true, |n| matches_search(d, n)))
        .collect();

    sort(&mut matches, query.sort_by, query.sort_order);
    matches
}

/// Dashboard counters over `deployments`.
pub fn compute_stats(deployments: &[Deployment], now: Timestamp) -> DeploymentStats {
    let mut stats = DeploymentStats::default();
    for d in deployments {
        if d.status.is_in_field() {
            stats.total_deployed += 1;
        }
        if d.status == DeploymentStatus::Returned {
            stats.total_returned += 1;
        }
        if d.is_overdue(now) {
            stats.overdue += 1;
        }
        if !d.all_tellers_complete() {
            stats.pending_completion += 1;
        }
        if d.priority == Priority::Urgent {
            stats.urgent += 1;
        }
    }
    stats
}

fn matches_search(d: &Deployment, needle: &str) -> bool {
    let hit = |s: &str| s.to_lowercase().contains(needle);
    hit(&d.item_name)
        || hit(&d.item_description)
        || hit(&d.notes)
        || d.assigned_tellers.iter().any(|t| hit(&t.teller_name))
}

fn sort(deployments: &mut [Deployment], field: SortField, order: SortOrder) {
    deployments.sort_by(|a, b| {
        let primary = match field {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::ExpectedReturnDate => a.expected_return_date.cmp(&b.expected_return_date),
            SortField::ItemName => a.item_name.to_lowercase().cmp(&b.item_name.to_lowercase()),
            SortField::Priority => a.priority.cmp(&b.priority),
        };
        let primary = match order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        // Ties: newest first, then id for a total order.
        primary
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}
