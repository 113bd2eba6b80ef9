// Product Domain Model - the exported entity

use serde::{Deserialize, Serialize};

/// Product listing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Inactive,
    Discontinued,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Inactive => "inactive",
            ProductStatus::Discontinued => "discontinued",
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProductStatus {
    type Err = crate::domain::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProductStatus::Active),
            "inactive" => Ok(ProductStatus::Inactive),
            "discontinued" => Ok(ProductStatus::Discontinued),
            other => Err(crate::domain::DomainError::ValidationError(format!(
                "unknown product status: {}",
                other
            ))),
        }
    }
}

/// Product row as served by the data source.
///
/// `id` is the scan ordering key: strictly increasing and indexed, which is
/// what makes `WHERE id > cursor` resumes cheap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub sku: String,
    pub category: String,
    pub status: ProductStatus,
    /// Price in minor currency units; rendered to 2 decimal places in CSV.
    pub price_cents: i64,
    pub created_at: i64, // epoch ms
}
