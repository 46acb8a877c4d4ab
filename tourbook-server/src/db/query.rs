//! Rendering a [`ListQuery`] into SQL
//!
//! Column names come only from the resource schema; every client-supplied
//! value is a bound parameter.

use sqlx::{Postgres, QueryBuilder};
use tourbook_core::{FilterValue, ListQuery, Pagination};

/// Append ` AND <column> <op> $n` for each filter. The builder must already
/// end inside a `WHERE` clause.
pub fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ListQuery) {
    for filter in &query.filters {
        builder
            .push(" AND ")
            .push(filter.column)
            .push(" ")
            .push(filter.op.as_sql())
            .push(" ");
        match &filter.value {
            FilterValue::Text(v) => builder.push_bind(v.clone()),
            FilterValue::Integer(v) => builder.push_bind(*v),
            FilterValue::Float(v) => builder.push_bind(*v),
            FilterValue::Bool(v) => builder.push_bind(*v),
            FilterValue::Timestamp(v) => builder.push_bind(*v),
            FilterValue::Uuid(v) => builder.push_bind(*v),
        };
    }
}

/// Append `ORDER BY`; `tiebreak` keeps paging stable when sort keys tie.
pub fn push_order(builder: &mut QueryBuilder<'_, Postgres>, query: &ListQuery, tiebreak: &'static str) {
    builder.push(" ORDER BY ");
    for key in &query.sort {
        builder
            .push(key.column)
            .push(" ")
            .push(key.direction.as_sql())
            .push(", ");
    }
    builder.push(tiebreak);
}

pub fn push_page(builder: &mut QueryBuilder<'_, Postgres>, pagination: Option<Pagination>) {
    if let Some(page) = pagination {
        builder
            .push(" LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
    }
}

/// Filters, order and page in one go.
pub fn push_list_query(
    builder: &mut QueryBuilder<'_, Postgres>,
    query: &ListQuery,
    tiebreak: &'static str,
) {
    push_filters(builder, query);
    push_order(builder, query, tiebreak);
    push_page(builder, query.pagination);
}
