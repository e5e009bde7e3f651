//! Maps the grid widget's server-side processing parameters onto PuppetDB
//! paging arguments.

use crate::errors::ErrorKind;
use crate::prelude::*;
use crate::puppetdb::QueryParams;

use puppetlens_query::{OrderBy, Query, SortDirection};
use serde::{Deserialize, Serialize};

/// Raw query string of a grid data request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GridParams {
    pub draw: Option<i64>,
    pub start: Option<u64>,
    pub length: Option<u64>,
    #[serde(rename = "search[value]")]
    pub search: Option<String>,
    #[serde(rename = "order[0][column]")]
    pub order_column: Option<usize>,
    #[serde(rename = "order[0][dir]")]
    pub order_dir: Option<String>,
}

/// A column of a grid whose rows come from PuppetDB.
///
/// `attr` is the key in each row, `filter` the PuppetDB field used for
/// ordering when it differs from `attr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Column {
    pub attr: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<&'static str>,
    pub name: &'static str,
}

impl Column {
    pub fn sort_field(&self) -> &'static str {
        self.filter.unwrap_or(self.attr)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub draw: i64,
    pub limit: u64,
    pub offset: u64,
    pub search: Option<String>,
    pub order_by: Option<OrderBy>,
}

impl PageRequest {
    /// Paging without ordering. `default_length` applies when the widget does
    /// not send `length`.
    pub fn from_grid(params: &GridParams, default_length: u64) -> Self {
        PageRequest {
            draw: params.draw.unwrap_or(0),
            limit: params.length.unwrap_or(default_length),
            offset: params.start.unwrap_or(0),
            search: params
                .search
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            order_by: None,
        }
    }

    /// Paging plus an `order_by` resolved through `columns`.
    ///
    /// A column index outside `columns` is an error rather than a fallback to
    /// the first column.
    pub fn from_grid_with_order(
        params: &GridParams,
        columns: &[Column],
        default_length: u64,
    ) -> Result<Self> {
        let index = params.order_column.unwrap_or(0);
        let column = columns
            .get(index)
            .ok_or(ErrorKind::InvalidSortColumn(index))?;
        let direction = match params.order_dir.as_deref() {
            None => SortDirection::Asc,
            Some(dir) => dir.parse::<SortDirection>()?,
        };
        let mut page = Self::from_grid(params, default_length);
        page.order_by = Some(OrderBy::single(column.sort_field(), direction));
        Ok(page)
    }

    pub fn to_query_params(&self, query: Option<Query>) -> QueryParams {
        QueryParams {
            query,
            order_by: self.order_by.clone(),
            limit: Some(self.limit),
            offset: Some(self.offset),
            include_total: true,
        }
    }
}
