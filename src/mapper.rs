//! Maps remote product records into grid row view-models.
use std::collections::{BTreeMap, HashMap};

use crate::model::{ActionKind, RemoteRecord};

/// Grid columns in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    CreatedOn,
    Id,
    Name,
    Skus,
    Status,
    RequiresMerge,
    Action,
}

impl Column {
    pub fn title(&self) -> &'static str {
        match self {
            Column::CreatedOn => "Created On",
            Column::Id => "ID",
            Column::Name => "Name",
            Column::Skus => "SKUs",
            Column::Status => "Status",
            Column::RequiresMerge => "RM",
            Column::Action => "Action",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    CreatedAscending,
    CreatedDescending,
    AsFetched,
}

/// Derived row; rebuilt on every fetch, never patched in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowViewModel {
    pub id: String,
    pub display_fields: BTreeMap<Column, String>,
    pub requires_merge: bool,
    pub primary_sku: Option<String>,
    pub synced: bool,
}

impl RowViewModel {
    pub fn field(&self, column: Column) -> &str {
        self.display_fields
            .get(&column)
            .map(String::as_str)
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedPage {
    pub rows: Vec<RowViewModel>,
    pub total: usize,
}

pub fn map_records(
    records: &[RemoteRecord],
    merge_flags: &HashMap<String, bool>,
    action: ActionKind,
    order: SortOrder,
) -> MappedPage {
    let mut sorted: Vec<&RemoteRecord> = records.iter().collect();
    match order {
        SortOrder::CreatedAscending => sorted.sort_by_key(|r| r.created_at),
        SortOrder::CreatedDescending => sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortOrder::AsFetched => {}
    }

    let rows: Vec<RowViewModel> = sorted
        .into_iter()
        .map(|rec| map_one(rec, merge_flags.get(&rec.id).copied().unwrap_or(false), action))
        .collect();
    let total = rows.len();
    MappedPage { rows, total }
}

fn map_one(rec: &RemoteRecord, requires_merge: bool, action: ActionKind) -> RowViewModel {
    let skus = rec
        .variants
        .iter()
        .map(|v| v.sku.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let mut fields = BTreeMap::new();
    fields.insert(Column::CreatedOn, rec.created_at.format("%Y-%m-%d").to_string());
    fields.insert(Column::Id, rec.id.clone());
    fields.insert(Column::Name, rec.title.clone());
    fields.insert(Column::Skus, skus);
    fields.insert(
        Column::Status,
        if rec.synced { "Synced" } else { "Not Synced" }.to_string(),
    );
    fields.insert(
        Column::RequiresMerge,
        if requires_merge { "Yes" } else { "No" }.to_string(),
    );
    fields.insert(Column::Action, row_action_label(action, rec.synced).to_string());

    RowViewModel {
        id: rec.id.clone(),
        display_fields: fields,
        requires_merge,
        primary_sku: rec.primary_sku().map(str::to_owned),
        synced: rec.synced,
    }
}

/// Already-synced rows re-run the sync instead of starting a fresh one.
pub fn is_resync(action: ActionKind, synced: bool) -> bool {
    action == ActionKind::Sync && synced
}

/// Label of the per-row action button.
pub fn row_action_label(action: ActionKind, synced: bool) -> &'static str {
    if is_resync(action, synced) {
        "Re-sync"
    } else {
        action.label()
    }
}
