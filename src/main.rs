use stock_demand::{AnalysisSession, Config, DataLoader, DemandTier, StockRisk};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

#[instrument]
fn main() -> Result<(), stock_demand::BoxError> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Starting stock demand analysis");

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    debug!("Loading config from path: {}", config_path);
    let config = Config::load(&config_path)?;
    debug!(?config, "Config loaded successfully");

    let loader = DataLoader::new(&config.data)?;
    let tables = loader.load()?;
    let mut session = AnalysisSession::new(tables, config);

    let metrics = session.metrics()?;
    println!("== Demand model ==");
    println!("MAE:  {:.2}", metrics.mae);
    println!("RMSE: {:.2}", metrics.rmse);
    println!("R2:   {:.3}", metrics.r_squared);

    let context = session.context()?;
    let thresholds = context.thresholds();
    let mut tier_counts: BTreeMap<DemandTier, usize> = BTreeMap::new();
    for tier in context.tiers() {
        *tier_counts.entry(*tier).or_default() += 1;
    }
    let mut risk_counts: BTreeMap<StockRisk, usize> = BTreeMap::new();
    for risk in context.risks() {
        *risk_counts.entry(*risk).or_default() += 1;
    }
    println!();
    println!("== Demand tiers (cuts {:.1} / {:.1}) ==", thresholds.low, thresholds.high);
    for tier in DemandTier::ALL {
        println!("{:<6} {}", tier, tier_counts.get(&tier).copied().unwrap_or(0));
    }
    println!();
    println!("== Stock risk ==");
    for risk in StockRisk::ALL {
        println!("{:<13} {}", risk, risk_counts.get(&risk).copied().unwrap_or(0));
    }

    let forecast = session.forecast()?.forecast.clone();
    println!();
    println!("== Forecast {}-{:02} ==", forecast.year, forecast.month);
    println!("Boosted trend: {:.0}", forecast.predicted_quantity);
    println!("Linear trend:  {:.0}", forecast.linear_estimate);

    println!();
    println!("== Top demand ==");
    for entry in session.top_demand()? {
        let name = entry.name.as_deref().unwrap_or("?");
        println!("{:>6} {:<30} {:>10.0}", entry.product_id, name, entry.quantity);
    }

    let shortage = session.stock_shortage()?;
    println!();
    println!("== Stock shortage ==");
    for entry in &shortage.entries {
        println!(
            "{:>6} {:<30} {:>8.0} / {:<8.0} {:>6.2} {}",
            entry.product_id, entry.name, entry.stock_current, entry.stock_min, entry.ratio, entry.risk
        );
    }
    if let Some(worst) = shortage.most_critical() {
        info!(product_id = worst.product_id, ratio = worst.ratio, "Most critical product");
    }

    println!();
    println!("== TOP demand under critical stock ==");
    for product in session.critical_top_products()? {
        println!(
            "{:>6} {:<30} {:>10.0} {:>8.0} / {:.0}",
            product.product_id, product.name, product.demand, product.stock_current, product.stock_min
        );
    }

    info!("Analysis complete");
    Ok(())
}
