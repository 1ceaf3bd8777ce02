//! Synthetic source tables shared by unit tests.

use crate::data_loader::SourceTables;
use polars::prelude::*;

/// Three products, one per stock-risk band (5/10, 14/10, 16/10).
pub fn small_products() -> DataFrame {
    df!(
        "id" => [1i64, 2, 3],
        "name" => ["Pan", "Leche", "Queso"],
        "category" => ["Alimentos", "Bebidas", "Alimentos"],
        "unit_price" => [10.0, 5.0, 20.0],
        "unit_cost" => [6.0, 3.0, 12.0],
        "margin_amount" => [4.0, 2.0, 8.0],
        "margin_pct" => ["40%", "40,5%", "40 %"],
        "stock_current" => [5i64, 14, 16],
        "stock_min" => [10i64, 10, 10],
    )
    .unwrap()
}

const CATEGORIES: [&str; 3] = ["Alimentos", "Bebidas", "Limpieza"];

/// Eight products over 2023-01..2024-11 with a seasonal, price-driven demand.
pub fn tables() -> SourceTables {
    let n_products = 8i64;

    let ids: Vec<i64> = (1..=n_products).collect();
    let names: Vec<String> = ids.iter().map(|id| format!("Producto {id}")).collect();
    let categories: Vec<&str> = ids.iter().map(|id| CATEGORIES[(*id as usize) % 3]).collect();
    let prices: Vec<f64> = ids.iter().map(|id| 5.0 + 2.5 * *id as f64).collect();
    let costs: Vec<f64> = prices.iter().map(|p| p * 0.6).collect();
    let margins: Vec<f64> = prices.iter().zip(&costs).map(|(p, c)| p - c).collect();
    let margin_pcts: Vec<String> = vec!["40%".to_string(); n_products as usize];
    let stock_current: Vec<i64> = ids.iter().map(|id| 4 + 3 * id).collect();
    let stock_min: Vec<i64> = ids.iter().map(|id| if *id == 8 { 0 } else { 12 }).collect();

    let products = df!(
        "id_producto" => ids.clone(),
        "name" => names,
        "category" => categories,
        "unit_price" => prices.clone(),
        "unit_cost" => costs.clone(),
        "margin_amount" => margins,
        "margin_pct" => margin_pcts,
        "stock_current" => stock_current,
        "stock_min" => stock_min,
    )
    .unwrap();

    let mut m_ids = Vec::new();
    let mut years = Vec::new();
    let mut months = Vec::new();
    let mut quantities = Vec::new();
    let mut m_prices = Vec::new();
    let mut m_costs = Vec::new();
    for (year, last_month) in [(2023i64, 12i64), (2024, 11)] {
        for month in 1..=last_month {
            let t = ((year - 2023) * 12 + month) as f64;
            for id in &ids {
                let base = 120.0 - 9.0 * *id as f64;
                let seasonal = 15.0 * ((month as f64) * std::f64::consts::PI / 6.0).sin();
                m_ids.push(*id);
                years.push(year);
                months.push(month);
                quantities.push((base + seasonal + 0.8 * t + ((id * month) % 7) as f64).round());
                m_prices.push(prices[(*id - 1) as usize] * (1.0 + 0.002 * t));
                m_costs.push(costs[(*id - 1) as usize]);
            }
        }
    }

    let monthly = df!(
        "id_product" => m_ids,
        "year" => years,
        "month" => months,
        "quantity" => quantities,
        "price" => m_prices,
        "cost" => m_costs,
    )
    .unwrap();

    let detail_ids: Vec<i64> = (0..40).map(|i| (i % n_products) + 1).collect();
    let detail_qty: Vec<f64> = (0..40).map(|i| ((i * 7) % 5 + 1) as f64).collect();
    let detail_sales = df!(
        "id_product" => detail_ids,
        "quantity" => detail_qty,
    )
    .unwrap();

    SourceTables {
        products,
        monthly,
        detail_sales,
    }
}
