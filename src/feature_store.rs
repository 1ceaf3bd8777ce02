//! Joins monthly product aggregates with product attributes and turns the
//! result into typed rows for the modeling stages.
//!
//! Rows are dropped, never imputed: a monthly row whose product id has no
//! match, or that carries a null in any column after the join, is excluded.

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

pub const PRODUCT_ID: &str = "product_id";
/// Alternate spellings of the product id accepted on every input table.
pub const PRODUCT_ID_ALIASES: [&str; 3] = ["id_product", "id_producto", "id"];

const PRODUCT_COLUMNS: [&str; 9] = [
    PRODUCT_ID,
    "name",
    "category",
    "unit_price",
    "unit_cost",
    "margin_amount",
    "margin_pct",
    "stock_current",
    "stock_min",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    pub product_id: i64,
    pub name: String,
    pub category: String,
    pub unit_price: f64,
    pub unit_cost: f64,
    pub margin_amount: f64,
    pub margin_pct: f64,
    pub stock_current: f64,
    pub stock_min: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetailSaleRow {
    pub product_id: i64,
    pub quantity: f64,
}

/// One product-month with the product's attributes attached.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedTrainingRow {
    pub product_id: i64,
    pub name: String,
    pub category: String,
    pub year: i32,
    pub month: u32,
    pub quantity: f64,
    pub avg_price: f64,
    pub avg_cost: f64,
    pub unit_price: f64,
    pub unit_cost: f64,
    pub margin_amount: f64,
    pub margin_pct: f64,
    pub stock_current: f64,
    pub stock_min: f64,
}

/// Renames the first product-id alias found to [`PRODUCT_ID`].
pub fn canonicalize_product_id(df: &mut DataFrame) -> Result<()> {
    if df.get_column_index(PRODUCT_ID).is_some() {
        return Ok(());
    }
    for alias in PRODUCT_ID_ALIASES {
        if df.get_column_index(alias).is_some() {
            df.rename(alias, PRODUCT_ID.into())?;
            debug!(alias, "Renamed product id column");
            return Ok(());
        }
    }
    Err(PipelineError::InvalidInput(format!(
        "no `{}` column (accepted aliases: {:?})",
        PRODUCT_ID, PRODUCT_ID_ALIASES
    )))
}

/// Parses a percentage such as `"35%"`, `"35,5 %"` or `"1.234,5%"` into a
/// plain number (`35.0`, `35.5`, `1234.5`).
///
/// When both `,` and `.` appear, the later one is the decimal separator and
/// the other is dropped as a thousands separator. A lone `,` is a decimal
/// separator.
pub fn normalize_percentage(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '%' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Left-joins `monthly` with the product attributes and drops every row
/// holding a null in any column.
#[instrument(skip_all)]
pub fn join_monthly_with_products(
    monthly: &DataFrame,
    products: &DataFrame,
) -> Result<Vec<JoinedTrainingRow>> {
    let mut monthly = monthly.clone();
    canonicalize_product_id(&mut monthly)?;
    let product_frame = select_products(products)?;
    ensure_unique_product_ids(&product_frame)?;
    ensure_unique_product_months(&monthly)?;

    let monthly_rows = monthly.height();
    let joined = monthly
        .lazy()
        .with_columns([
            col(PRODUCT_ID).cast(DataType::Int64),
            col("year").cast(DataType::Int64),
            col("month").cast(DataType::Int64),
            col("quantity").cast(DataType::Float64),
            col("price").cast(DataType::Float64),
            col("cost").cast(DataType::Float64),
        ])
        .join(
            product_frame.lazy(),
            [col(PRODUCT_ID)],
            [col(PRODUCT_ID)],
            JoinArgs::new(JoinType::Left),
        )
        .drop_nulls(None)
        .collect()?;

    debug!(
        monthly_rows,
        joined_rows = joined.height(),
        shape = ?joined.shape(),
        "Join complete"
    );
    if joined.height() == 0 {
        return Err(PipelineError::DataQuality(format!(
            "join produced zero usable rows from {} monthly rows",
            monthly_rows
        )));
    }
    if joined.height() < monthly_rows {
        warn!(
            dropped = monthly_rows - joined.height(),
            "Dropped monthly rows with unmatched products or missing values"
        );
    }

    let product_ids = i64_values(&joined, PRODUCT_ID)?;
    let names = string_values(&joined, "name")?;
    let categories = string_values(&joined, "category")?;
    let years = i64_values(&joined, "year")?;
    let months = i64_values(&joined, "month")?;
    let quantities = f64_values(&joined, "quantity")?;
    let prices = f64_values(&joined, "price")?;
    let costs = f64_values(&joined, "cost")?;
    let unit_prices = f64_values(&joined, "unit_price")?;
    let unit_costs = f64_values(&joined, "unit_cost")?;
    let margin_amounts = f64_values(&joined, "margin_amount")?;
    let margin_pcts = percentage_values(&joined, "margin_pct")?;
    let stock_current = f64_values(&joined, "stock_current")?;
    let stock_min = f64_values(&joined, "stock_min")?;

    let mut rows = Vec::with_capacity(joined.height());
    for i in 0..joined.height() {
        rows.push(JoinedTrainingRow {
            product_id: product_ids[i],
            name: names[i].clone(),
            category: categories[i].clone(),
            year: calendar_year(years[i])?,
            month: calendar_month(months[i])?,
            quantity: quantities[i],
            avg_price: prices[i],
            avg_cost: costs[i],
            unit_price: unit_prices[i],
            unit_cost: unit_costs[i],
            margin_amount: margin_amounts[i],
            margin_pct: margin_pcts[i],
            stock_current: stock_current[i],
            stock_min: stock_min[i],
        });
    }

    info!(rows = rows.len(), "Joined training rows ready");
    Ok(rows)
}

/// Complete product rows; rows with any missing attribute or an unparsable
/// margin percentage are skipped.
pub fn product_records(products: &DataFrame) -> Result<Vec<ProductRecord>> {
    let frame = select_products(products)?;
    ensure_unique_product_ids(&frame)?;

    let total = frame.height();
    let complete = frame.lazy().drop_nulls(None).collect()?;
    if complete.height() < total {
        warn!(skipped = total - complete.height(), "Skipped incomplete product rows");
    }

    let ids = i64_values(&complete, PRODUCT_ID)?;
    let names = string_values(&complete, "name")?;
    let categories = string_values(&complete, "category")?;
    let unit_prices = f64_values(&complete, "unit_price")?;
    let unit_costs = f64_values(&complete, "unit_cost")?;
    let margin_amounts = f64_values(&complete, "margin_amount")?;
    let margin_pcts = string_values(&complete, "margin_pct")?;
    let stock_current = f64_values(&complete, "stock_current")?;
    let stock_min = f64_values(&complete, "stock_min")?;

    let mut records = Vec::with_capacity(complete.height());
    for i in 0..complete.height() {
        // only joined rows must carry a readable margin
        let Some(margin_pct) = normalize_percentage(&margin_pcts[i]) else {
            warn!(
                product_id = ids[i],
                raw = %margin_pcts[i],
                "Skipped product with unparsable margin percentage"
            );
            continue;
        };
        records.push(ProductRecord {
            product_id: ids[i],
            name: names[i].clone(),
            category: categories[i].clone(),
            unit_price: unit_prices[i],
            unit_cost: unit_costs[i],
            margin_amount: margin_amounts[i],
            margin_pct,
            stock_current: stock_current[i],
            stock_min: stock_min[i],
        });
    }
    Ok(records)
}

/// Detail sale lines in table order; lines without an id or quantity are skipped.
pub fn detail_sales(detail: &DataFrame) -> Result<Vec<DetailSaleRow>> {
    let mut detail = detail.clone();
    canonicalize_product_id(&mut detail)?;

    let frame = detail
        .lazy()
        .select([
            col(PRODUCT_ID).cast(DataType::Int64),
            col("quantity").cast(DataType::Float64),
        ])
        .drop_nulls(None)
        .collect()?;

    let ids = i64_values(&frame, PRODUCT_ID)?;
    let quantities = f64_values(&frame, "quantity")?;
    Ok(ids
        .into_iter()
        .zip(quantities)
        .map(|(product_id, quantity)| DetailSaleRow {
            product_id,
            quantity,
        })
        .collect())
}

fn select_products(products: &DataFrame) -> Result<DataFrame> {
    let mut products = products.clone();
    canonicalize_product_id(&mut products)?;

    let frame = products
        .lazy()
        .select([
            col(PRODUCT_COLUMNS[0]).cast(DataType::Int64),
            col(PRODUCT_COLUMNS[1]).cast(DataType::String),
            col(PRODUCT_COLUMNS[2]).cast(DataType::String),
            col(PRODUCT_COLUMNS[3]).cast(DataType::Float64),
            col(PRODUCT_COLUMNS[4]).cast(DataType::Float64),
            col(PRODUCT_COLUMNS[5]).cast(DataType::Float64),
            col(PRODUCT_COLUMNS[6]).cast(DataType::String),
            col(PRODUCT_COLUMNS[7]).cast(DataType::Float64),
            col(PRODUCT_COLUMNS[8]).cast(DataType::Float64),
        ])
        .collect()?;
    Ok(frame)
}

fn ensure_unique_product_ids(products: &DataFrame) -> Result<()> {
    let column = products.column(PRODUCT_ID)?.cast(&DataType::Int64)?;
    let mut seen = HashSet::new();
    for id in column.i64()?.into_iter().flatten() {
        if !seen.insert(id) {
            return Err(PipelineError::DataQuality(format!(
                "product id {} appears more than once in the product table",
                id
            )));
        }
    }
    Ok(())
}

fn ensure_unique_product_months(monthly: &DataFrame) -> Result<()> {
    let keys = monthly
        .clone()
        .lazy()
        .select([
            col(PRODUCT_ID).cast(DataType::Int64),
            col("year").cast(DataType::Int64),
            col("month").cast(DataType::Int64),
        ])
        .drop_nulls(None)
        .collect()?;

    let ids = i64_values(&keys, PRODUCT_ID)?;
    let years = i64_values(&keys, "year")?;
    let months = i64_values(&keys, "month")?;

    let mut seen = HashSet::new();
    for ((id, year), month) in ids.into_iter().zip(years).zip(months) {
        if !seen.insert((id, year, month)) {
            return Err(PipelineError::DataQuality(format!(
                "monthly aggregate repeats product {} for {}-{:02}",
                id, year, month
            )));
        }
    }
    Ok(())
}

pub(crate) fn calendar_year(value: i64) -> Result<i32> {
    i32::try_from(value)
        .ok()
        .filter(|year| (1..=9999).contains(year))
        .ok_or_else(|| PipelineError::DataQuality(format!("invalid year {}", value)))
}

pub(crate) fn calendar_month(value: i64) -> Result<u32> {
    u32::try_from(value)
        .ok()
        .filter(|month| (1..=12).contains(month))
        .ok_or_else(|| PipelineError::DataQuality(format!("invalid month {}", value)))
}

fn null_in(name: &str) -> PipelineError {
    PipelineError::DataQuality(format!("null value in column `{}`", name))
}

pub(crate) fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    let values = column.f64()?;
    values.into_iter().map(|v| v.ok_or_else(|| null_in(name))).collect()
}

pub(crate) fn i64_values(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    let column = df.column(name)?.cast(&DataType::Int64)?;
    let values = column.i64()?;
    values.into_iter().map(|v| v.ok_or_else(|| null_in(name))).collect()
}

fn string_values(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    let values = column.str()?;
    values
        .into_iter()
        .map(|v| v.map(str::to_string).ok_or_else(|| null_in(name)))
        .collect()
}

fn percentage_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    string_values(df, name)?
        .iter()
        .map(|raw| {
            normalize_percentage(raw).ok_or_else(|| {
                PipelineError::DataQuality(format!("unparsable percentage {:?} in `{}`", raw, name))
            })
        })
        .collect()
}
