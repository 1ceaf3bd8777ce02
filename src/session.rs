//! The per-session modeling state.
//!
//! [`AnalysisSession`] builds its [`ModelingContext`] on the first query and
//! reuses it for every later one. Initialization takes `&mut self`, so two
//! callers cannot race to train; a host sharing a session across threads has
//! to wrap it in its own lock. A failed initialization stores nothing, and
//! every query keeps returning the error.

use crate::config::Config;
use crate::data_loader::SourceTables;
use crate::demand::{train_demand_model, DemandModel, DemandTraining};
use crate::error::Result;
use crate::feature_store::{
    detail_sales, join_monthly_with_products, product_records, DetailSaleRow, JoinedTrainingRow,
    ProductRecord,
};
use crate::metrics::RegressionMetrics;
use crate::ranking::{
    critical_top_products, stock_shortage, top_demand, CriticalProduct, DemandRankEntry,
    StockShortageReport,
};
use crate::risk::{classify_stock, StockRisk};
use crate::tiers::{DemandTier, TierThresholds};
use crate::trend::{MonthlySeries, TrendForecast};
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct ModelingContext {
    rows: Vec<JoinedTrainingRow>,
    products: Vec<ProductRecord>,
    sales: Vec<DetailSaleRow>,
    demand: DemandTraining,
    thresholds: TierThresholds,
    tiers: Vec<DemandTier>,
    risks: Vec<StockRisk>,
}

impl ModelingContext {
    /// Join, preprocess, train, score, then label every joined row.
    #[instrument(skip_all)]
    pub fn build(tables: &SourceTables, config: &Config) -> Result<Self> {
        info!("Initializing modeling context");

        let rows = join_monthly_with_products(&tables.monthly, &tables.products)?;
        let products = product_records(&tables.products)?;
        let sales = detail_sales(&tables.detail_sales)?;

        let demand = train_demand_model(&rows, &config.demand_model, &config.split)?;
        let thresholds = TierThresholds::from_training_targets(&demand.train_targets, &config.tiers)?;

        let quantities: Vec<f64> = rows.iter().map(|row| row.quantity).collect();
        let tiers = thresholds.classify_all(&quantities);
        let risks = rows
            .iter()
            .map(|row| classify_stock(row.stock_current, row.stock_min, &config.risk))
            .collect();

        info!(
            rows = rows.len(),
            products = products.len(),
            low_cut = thresholds.low,
            high_cut = thresholds.high,
            "Modeling context ready"
        );
        Ok(Self {
            rows,
            products,
            sales,
            demand,
            thresholds,
            tiers,
            risks,
        })
    }

    pub fn rows(&self) -> &[JoinedTrainingRow] {
        &self.rows
    }

    pub fn products(&self) -> &[ProductRecord] {
        &self.products
    }

    pub fn sales(&self) -> &[DetailSaleRow] {
        &self.sales
    }

    pub fn demand_model(&self) -> &DemandModel {
        &self.demand.model
    }

    pub fn training(&self) -> &DemandTraining {
        &self.demand
    }

    pub fn metrics(&self) -> RegressionMetrics {
        self.demand.evaluation.metrics
    }

    pub fn test_predictions(&self) -> &[f64] {
        &self.demand.evaluation.predictions
    }

    pub fn thresholds(&self) -> TierThresholds {
        self.thresholds
    }

    /// One label per joined row, in row order.
    pub fn tiers(&self) -> &[DemandTier] {
        &self.tiers
    }

    /// One label per joined row, in row order.
    pub fn risks(&self) -> &[StockRisk] {
        &self.risks
    }

    /// Labels rows outside the training data with the frozen cuts.
    pub fn classify_tiers(&self, rows: &[JoinedTrainingRow]) -> Vec<DemandTier> {
        rows.iter()
            .map(|row| self.thresholds.classify(row.quantity))
            .collect()
    }

    pub fn predict_demand(&self, rows: &[JoinedTrainingRow]) -> Result<Vec<f64>> {
        self.demand.model.predict(rows)
    }
}

pub struct AnalysisSession {
    tables: SourceTables,
    config: Config,
    context: Option<ModelingContext>,
    trend: Option<TrendForecast>,
}

impl AnalysisSession {
    pub fn new(tables: SourceTables, config: Config) -> Self {
        Self {
            tables,
            config,
            context: None,
            trend: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    /// Builds the context on first use; later calls return the same one.
    pub fn context(&mut self) -> Result<&ModelingContext> {
        let context = match self.context.take() {
            Some(context) => context,
            None => ModelingContext::build(&self.tables, &self.config)?,
        };
        Ok(self.context.insert(context))
    }

    pub fn metrics(&mut self) -> Result<RegressionMetrics> {
        Ok(self.context()?.metrics())
    }

    pub fn product_risks(&mut self) -> Result<Vec<(i64, StockRisk)>> {
        let params = self.config.risk;
        Ok(self
            .context()?
            .products()
            .iter()
            .map(|p| (p.product_id, classify_stock(p.stock_current, p.stock_min, &params)))
            .collect())
    }

    /// The December forecast. Gated on the modeling context so a failed
    /// initialization blocks it like every other query.
    pub fn forecast(&mut self) -> Result<&TrendForecast> {
        self.context()?;
        let trend = match self.trend.take() {
            Some(trend) => trend,
            None => {
                let series = MonthlySeries::from_monthly(&self.tables.monthly)?;
                TrendForecast::fit(series, &self.config.trend_model, &self.config.split)?
            }
        };
        Ok(self.trend.insert(trend))
    }

    pub fn top_demand(&mut self) -> Result<Vec<DemandRankEntry>> {
        let n = self.config.report.top_demand;
        let context = self.context()?;
        Ok(top_demand(context.sales(), context.products(), n))
    }

    pub fn stock_shortage(&mut self) -> Result<StockShortageReport> {
        let params = self.config.risk;
        let n = self.config.report.stock_shortage;
        stock_shortage(self.context()?.products(), &params, n)
    }

    pub fn critical_top_products(&mut self) -> Result<Vec<CriticalProduct>> {
        let params = self.config.risk;
        let n = self.config.report.critical_top;
        let context = self.context()?;
        critical_top_products(context.rows(), context.tiers(), &params, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::fixtures;
    use polars::prelude::*;

    fn session() -> AnalysisSession {
        AnalysisSession::new(fixtures::tables(), Config::standard())
    }

    #[test]
    fn test_context_is_built_once() {
        let mut session = session();
        assert!(!session.is_initialized());

        let first = session.context().unwrap() as *const ModelingContext;
        assert!(session.is_initialized());
        let second = session.context().unwrap() as *const ModelingContext;
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_labels_cover_every_row() {
        let mut session = session();
        let context = session.context().unwrap();

        assert_eq!(context.rows().len(), 8 * 23);
        assert_eq!(context.tiers().len(), context.rows().len());
        assert_eq!(context.risks().len(), context.rows().len());
        assert!(context.tiers().iter().all(|t| DemandTier::ALL.contains(t)));
        assert!(context.risks().iter().all(|r| StockRisk::ALL.contains(r)));

        let thresholds = context.thresholds();
        assert!(thresholds.low <= thresholds.high);
        for tier in DemandTier::ALL {
            assert!(context.tiers().contains(&tier));
        }
    }

    #[test]
    fn test_thresholds_use_training_partition_only() {
        let mut session = session();
        let context = session.context().unwrap();
        let training = context.training();

        let expected = TierThresholds::from_training_targets(
            &training.train_targets,
            &Config::standard().tiers,
        )
        .unwrap();
        assert_eq!(context.thresholds(), expected);
        assert_eq!(training.train_targets.len(), training.split.train.len());
        assert_eq!(
            context.test_predictions().len(),
            training.split.test.len()
        );
    }

    #[test]
    fn test_demand_model_predicts_new_rows() {
        let mut session = session();
        let context = session.context().unwrap();

        let mut unseen = context.rows()[0].clone();
        unseen.category = "Ferretería".to_string();
        let predictions = context.predict_demand(&[unseen.clone()]).unwrap();
        assert_eq!(predictions.len(), 1);
        assert!(predictions[0].is_finite());

        let tiers = context.classify_tiers(&[unseen.clone(), unseen]);
        assert_eq!(tiers[0], tiers[1]);
    }

    #[test]
    fn test_pipeline_is_reproducible() {
        let mut a = session();
        let mut b = session();

        let (ta, tb) = (a.context().unwrap().thresholds(), b.context().unwrap().thresholds());
        assert_eq!(ta.low.to_bits(), tb.low.to_bits());
        assert_eq!(ta.high.to_bits(), tb.high.to_bits());
        assert_eq!(a.metrics().unwrap(), b.metrics().unwrap());
        assert_eq!(
            a.forecast().unwrap().forecast,
            b.forecast().unwrap().forecast
        );
    }

    #[test]
    fn test_rankings_and_product_risks() {
        let mut session = session();

        let top = session.top_demand().unwrap();
        assert_eq!(top.len(), 8);
        assert!(top.windows(2).all(|w| w[0].quantity >= w[1].quantity));
        assert!(top.iter().all(|e| e.name.is_some()));

        // product 8 has a zero minimum: labeled, but absent from the ratio ranking
        let risks = session.product_risks().unwrap();
        assert_eq!(risks.len(), 8);
        assert!(risks.contains(&(8, StockRisk::SinRiesgo)));
        let shortage = session.stock_shortage().unwrap();
        assert_eq!(shortage.entries.len(), 7);
        assert!(shortage.entries.iter().all(|e| e.product_id != 8));
        assert_eq!(shortage.most_critical().unwrap().product_id, 1);

        let critical = session.critical_top_products().unwrap();
        assert!(critical.iter().all(|p| p.stock_current < p.stock_min * 1.2));
    }

    #[test]
    fn test_failed_initialization_blocks_queries() {
        let mut tables = fixtures::tables();
        tables.monthly = df!(
            "product_id" => [100i64, 101],
            "year" => [2024i64, 2024],
            "month" => [1i64, 2],
            "quantity" => [1.0, 2.0],
            "price" => [1.0, 1.0],
            "cost" => [1.0, 1.0],
        )
        .unwrap();
        let mut session = AnalysisSession::new(tables, Config::standard());

        assert!(matches!(session.context(), Err(PipelineError::DataQuality(_))));
        assert!(session.metrics().is_err());
        assert!(session.forecast().is_err());
        assert!(session.top_demand().is_err());
        assert!(!session.is_initialized());
    }

    #[test]
    fn test_too_few_rows_is_split_error() {
        let mut tables = fixtures::tables();
        tables.monthly = df!(
            "product_id" => [1i64, 2],
            "year" => [2024i64, 2024],
            "month" => [1i64, 1],
            "quantity" => [1.0, 2.0],
            "price" => [1.0, 1.0],
            "cost" => [1.0, 1.0],
        )
        .unwrap();
        let mut session = AnalysisSession::new(tables, Config::standard());
        assert!(matches!(session.context(), Err(PipelineError::Split { .. })));
    }
}
