use crate::config::DataPaths;
use crate::feature_store::canonicalize_product_id;
use anyhow::{Context, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The three input tables, with product ids under their canonical name.
#[derive(Debug, Clone)]
pub struct SourceTables {
    pub products: DataFrame,
    pub monthly: DataFrame,
    pub detail_sales: DataFrame,
}

impl SourceTables {
    /// Bundles already-loaded frames, normalizing product-id aliases.
    pub fn new(
        mut products: DataFrame,
        mut monthly: DataFrame,
        mut detail_sales: DataFrame,
    ) -> Result<Self> {
        canonicalize_product_id(&mut products).context("products table")?;
        canonicalize_product_id(&mut monthly).context("monthly table")?;
        canonicalize_product_id(&mut detail_sales).context("detail sales table")?;
        Ok(Self {
            products,
            monthly,
            detail_sales,
        })
    }
}

/// DataLoader reads the source tables from CSV or Parquet files
pub struct DataLoader {
    products: PathBuf,
    monthly: PathBuf,
    detail_sales: PathBuf,
}

impl DataLoader {
    pub fn new(paths: &DataPaths) -> Result<Self> {
        let loader = Self {
            products: PathBuf::from(&paths.products),
            monthly: PathBuf::from(&paths.monthly),
            detail_sales: PathBuf::from(&paths.detail_sales),
        };

        for path in [&loader.products, &loader.monthly, &loader.detail_sales] {
            if !path.exists() {
                anyhow::bail!("Input table not found: {}", path.display());
            }
        }
        Ok(loader)
    }

    /// Loads all three tables
    pub fn load(&self) -> Result<SourceTables> {
        let products = read_table(&self.products)?;
        let monthly = read_table(&self.monthly)?;
        let detail_sales = read_table(&self.detail_sales)?;

        info!(
            products = products.height(),
            monthly = monthly.height(),
            detail_sales = detail_sales.height(),
            "Source tables loaded"
        );
        SourceTables::new(products, monthly, detail_sales)
    }
}

/// Reads one table, choosing the format from the file extension.
pub fn read_table(path: &Path) -> Result<DataFrame> {
    debug!("Reading table from {}", path.display());

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let df = match extension.as_deref() {
        Some("parquet") => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            ParquetReader::new(file)
                .finish()
                .with_context(|| format!("Failed to read parquet {}", path.display()))?
        }
        Some("csv") => CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .with_context(|| format!("Failed to open {}", path.display()))?
            .finish()
            .with_context(|| format!("Failed to read csv {}", path.display()))?,
        _ => anyhow::bail!("Unsupported table format: {}", path.display()),
    };

    debug!(shape = ?df.shape(), "Table read");
    Ok(df)
}
