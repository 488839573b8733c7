//! Keyset pagination over `files`.
//!
//! Rows are ordered by `(field, id)`. A cursor is the `(field, id)` pair of
//! the last row a client has seen, and the next page is every row strictly
//! past it in the chosen direction. Inserts and deletes between requests
//! never shift or repeat rows the way offsets do.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use sea_orm::{ColumnTrait, Condition, Order, QueryOrder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::file;
use crate::error::{AppError, AppResult};

pub const DEFAULT_PAGE_LIMIT: u64 = 10;
pub const MAX_PAGE_LIMIT: u64 = 100;

/// Current time at the precision timestamps are stored with.
pub fn now_millis() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(3)
}

fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.and_utc().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> AppResult<NaiveDateTime> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|_| AppError::BadRequest(format!("invalid cursor timestamp: {raw}")))?;
    Ok(parsed.trunc_subsecs(3))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    CreatedAt,
    Name,
    Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl From<SortDirection> for Order {
    fn from(direction: SortDirection) -> Self {
        match direction {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct OrderBy {
    #[serde(default)]
    pub field: SortField,
    #[serde(default)]
    pub order: SortDirection,
}

/// Position of the last row a client has seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Cursor {
    /// The sort field's value; RFC 3339 with milliseconds for `createdAt`.
    #[serde(alias = "createdAt")]
    pub value: String,
    pub id: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub cursor: Option<Cursor>,
    #[schema(default = 10, minimum = 1, maximum = 100)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub order_by: OrderBy,
}

impl PageQuery {
    pub fn limit(&self) -> AppResult<u64> {
        match self.limit.unwrap_or(DEFAULT_PAGE_LIMIT) {
            limit @ 1..=MAX_PAGE_LIMIT => Ok(limit),
            other => Err(AppError::BadRequest(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Cursor>,
}

/// One ordering over `files`, usable as SQL (`apply`, `after`) and in memory
/// (`compare`, `cursor_for`). All four agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeysetOrder {
    field: SortField,
    direction: SortDirection,
}

impl From<OrderBy> for KeysetOrder {
    fn from(order_by: OrderBy) -> Self {
        Self::new(order_by.field, order_by.order)
    }
}

impl KeysetOrder {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    fn column(&self) -> file::Column {
        match self.field {
            SortField::CreatedAt => file::Column::CreatedAt,
            SortField::Name => file::Column::Name,
            SortField::Type => file::Column::FileType,
        }
    }

    fn cursor_value(&self, cursor: &Cursor) -> AppResult<sea_orm::Value> {
        Ok(match self.field {
            SortField::CreatedAt => parse_timestamp(&cursor.value)?.into(),
            SortField::Name | SortField::Type => cursor.value.clone().into(),
        })
    }

    /// Rows strictly past `cursor`: `field` beyond the cursor value, or equal
    /// with `id` beyond the cursor id.
    pub fn after(&self, cursor: &Cursor) -> AppResult<Condition> {
        let column = self.column();
        let value = self.cursor_value(cursor)?;

        let (field_past, id_past) = match self.direction {
            SortDirection::Desc => (column.lt(value.clone()), file::Column::Id.lt(cursor.id)),
            SortDirection::Asc => (column.gt(value.clone()), file::Column::Id.gt(cursor.id)),
        };

        Ok(Condition::any().add(field_past).add(
            Condition::all()
                .add(column.eq(value))
                .add(id_past),
        ))
    }

    pub fn apply<Q: QueryOrder>(&self, query: Q) -> Q {
        let order: Order = self.direction.into();
        query
            .order_by(self.column(), order.clone())
            .order_by(file::Column::Id, order)
    }

    pub fn cursor_for(&self, model: &file::Model) -> Cursor {
        let value = match self.field {
            SortField::CreatedAt => format_timestamp(model.created_at),
            SortField::Name => model.name.clone(),
            SortField::Type => model.file_type.clone(),
        };
        Cursor { value, id: model.id }
    }

    /// Orders `a` before `b` when `a` belongs earlier in the listing.
    pub fn compare(&self, a: &file::Model, b: &file::Model) -> Ordering {
        let by_field = match self.field {
            SortField::CreatedAt => a
                .created_at
                .trunc_subsecs(3)
                .cmp(&b.created_at.trunc_subsecs(3)),
            SortField::Name => a.name.as_bytes().cmp(b.name.as_bytes()),
            SortField::Type => a.file_type.as_bytes().cmp(b.file_type.as_bytes()),
        };
        let ascending = by_field.then_with(|| a.id.cmp(&b.id));
        match self.direction {
            SortDirection::Asc => ascending,
            SortDirection::Desc => ascending.reverse(),
        }
    }

    /// Builds a page from rows fetched with `apply` and `after`.
    pub fn page<T>(&self, rows: Vec<file::Model>, map: impl Fn(file::Model) -> T) -> Page<T> {
        let next_cursor = rows.last().map(|row| self.cursor_for(row));
        Page {
            items: rows.into_iter().map(map).collect(),
            next_cursor,
        }
    }
}
