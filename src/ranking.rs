//! Derived rankings over raw sales, product stock and classified rows.

use crate::config::RiskParams;
use crate::error::{PipelineError, Result};
use crate::feature_store::{DetailSaleRow, JoinedTrainingRow, ProductRecord};
use crate::models::LinearRegression;
use crate::risk::{classify_stock, stock_ratio, StockRisk};
use crate::tiers::DemandTier;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct DemandRankEntry {
    pub product_id: i64,
    /// `None` when the product table has no complete row for the id.
    pub name: Option<String>,
    pub quantity: f64,
}

/// Sums detail quantities per product and keeps the `n` largest. Equal
/// totals keep the order in which the product first appears in `sales`.
pub fn top_demand(
    sales: &[DetailSaleRow],
    products: &[ProductRecord],
    n: usize,
) -> Vec<DemandRankEntry> {
    let mut positions: HashMap<i64, usize> = HashMap::new();
    let mut totals: Vec<(i64, f64)> = Vec::new();
    for sale in sales {
        match positions.get(&sale.product_id) {
            Some(&i) => totals[i].1 += sale.quantity,
            None => {
                positions.insert(sale.product_id, totals.len());
                totals.push((sale.product_id, sale.quantity));
            }
        }
    }

    // stable: ties stay in first-appearance order
    totals.sort_by(|a, b| b.1.total_cmp(&a.1));

    let names: HashMap<i64, &str> = products
        .iter()
        .map(|p| (p.product_id, p.name.as_str()))
        .collect();

    totals
        .into_iter()
        .take(n)
        .map(|(product_id, quantity)| DemandRankEntry {
            product_id,
            name: names.get(&product_id).map(|name| name.to_string()),
            quantity,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct StockShortageEntry {
    pub product_id: i64,
    pub name: String,
    pub stock_current: f64,
    pub stock_min: f64,
    pub ratio: f64,
    pub risk: StockRisk,
}

#[derive(Debug, Clone)]
pub struct StockShortageReport {
    pub entries: Vec<StockShortageEntry>,
    /// Current stock regressed on minimum stock over the ranked entries.
    pub trend: Option<LinearRegression>,
}

impl StockShortageReport {
    pub fn most_critical(&self) -> Option<&StockShortageEntry> {
        self.entries.first()
    }
}

/// Products with a positive minimum, lowest current/minimum ratio first.
/// Products whose minimum is not positive have no ratio and are left out.
pub fn stock_shortage(
    products: &[ProductRecord],
    params: &RiskParams,
    n: usize,
) -> Result<StockShortageReport> {
    let mut entries: Vec<StockShortageEntry> = products
        .iter()
        .filter_map(|p| {
            stock_ratio(p.stock_current, p.stock_min).map(|ratio| StockShortageEntry {
                product_id: p.product_id,
                name: p.name.clone(),
                stock_current: p.stock_current,
                stock_min: p.stock_min,
                ratio,
                risk: classify_stock(p.stock_current, p.stock_min, params),
            })
        })
        .collect();

    entries.sort_by(|a, b| a.ratio.total_cmp(&b.ratio));
    entries.truncate(n);

    let trend = if entries.is_empty() {
        None
    } else {
        let minimums: Vec<f64> = entries.iter().map(|e| e.stock_min).collect();
        let currents: Vec<f64> = entries.iter().map(|e| e.stock_current).collect();
        let mut model = LinearRegression::new();
        model.fit_xy(&minimums, &currents)?;
        Some(model)
    };

    Ok(StockShortageReport { entries, trend })
}

#[derive(Debug, Clone, PartialEq)]
pub struct CriticalProduct {
    pub product_id: i64,
    pub name: String,
    pub demand: f64,
    pub stock_current: f64,
    pub stock_min: f64,
}

/// TOP-tier demand per product where stock sits under
/// `critical_factor * minimum`, highest demand first (ties by product id).
pub fn critical_top_products(
    rows: &[JoinedTrainingRow],
    tiers: &[DemandTier],
    params: &RiskParams,
    n: usize,
) -> Result<Vec<CriticalProduct>> {
    if rows.len() != tiers.len() {
        return Err(PipelineError::InvalidInput(format!(
            "{} rows but {} tier labels",
            rows.len(),
            tiers.len()
        )));
    }

    let mut grouped: BTreeMap<i64, CriticalProduct> = BTreeMap::new();
    for (row, tier) in rows.iter().zip(tiers) {
        if *tier != DemandTier::Top {
            continue;
        }
        grouped
            .entry(row.product_id)
            .or_insert_with(|| CriticalProduct {
                product_id: row.product_id,
                name: row.name.clone(),
                demand: 0.0,
                stock_current: row.stock_current,
                stock_min: row.stock_min,
            })
            .demand += row.quantity;
    }

    let mut critical: Vec<CriticalProduct> = grouped
        .into_values()
        .filter(|p| p.stock_min > 0.0 && p.stock_current < p.stock_min * params.critical_factor)
        .collect();
    critical.sort_by(|a, b| b.demand.total_cmp(&a.demand));
    critical.truncate(n);
    Ok(critical)
}
