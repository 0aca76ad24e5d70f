//! Product catalog

use std::sync::Arc;

use loan_agent_config::CatalogConfig;
use loan_agent_core::Product;

use crate::loader::load_products;

/// Immutable set of products shared by all sessions
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: Arc<[Product]>,
}

impl ProductCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products: products.into(),
        }
    }

    /// Load from the configured lender documents
    ///
    /// An empty result is logged as an error and returned anyway; matching
    /// against it reports an error status.
    pub fn load(config: &CatalogConfig) -> Self {
        let catalog = Self::new(load_products(config));
        if catalog.is_empty() {
            tracing::error!(
                documents_dir = %config.documents_dir,
                "Product catalog is empty"
            );
        } else {
            tracing::info!(
                products = catalog.len(),
                lenders = catalog.lenders().len(),
                "Product catalog loaded"
            );
        }
        catalog
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Find a product by lender and name, case-insensitively
    pub fn find(&self, lender: &str, name: &str) -> Option<&Product> {
        self.products
            .iter()
            .find(|p| p.lender.eq_ignore_ascii_case(lender) && p.name.eq_ignore_ascii_case(name))
    }

    /// Distinct lender names in load order
    pub fn lenders(&self) -> Vec<&str> {
        let mut lenders: Vec<&str> = Vec::new();
        for product in self.products.iter() {
            if !lenders.contains(&product.lender.as_str()) {
                lenders.push(&product.lender);
            }
        }
        lenders
    }
}
