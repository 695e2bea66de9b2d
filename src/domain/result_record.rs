//! Result records - one durable output row per processed identifier

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::outcome::{AddToCartState, CartVerdict, RecordStatus};

/// Fixed column schema of every batch output file
pub const CSV_HEADER: [&str; 29] = [
    "UPC",
    "AddToCart",
    "ProductURL",
    "Status",
    "Message",
    "ProductName",
    "ItemNumber",
    "ProductUPC",
    "VendorItemNumber",
    "CasePack",
    "ProductDetailDescription",
    "ProductDetailPrice",
    "MsrpPricing",
    "Stock",
    "OutOfStock",
    "BrandName",
    "ItemUpcEanNumber",
    "BulletFeatures",
    "CatalogPageNumber",
    "DropShipOnly",
    "MsrpPrice",
    "PrimaryColor",
    "ProhibitedStates",
    "VendorItemNo",
    "YearLaunched",
    "Prop65Applies",
    "Prop65CancerHarm",
    "Prop65ReproductiveHarm",
    "Screenshot",
];

/// Raw product attributes captured from a product page.
///
/// Values are kept exactly as read (trimmed); nothing is parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub product_name: Option<String>,
    pub item_number: Option<String>,
    pub product_upc: Option<String>,
    pub vendor_item_number: Option<String>,
    pub case_pack: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    pub msrp_pricing: Option<String>,
    pub stock: Option<String>,
    pub out_of_stock: Option<String>,

    // specification table
    pub brand_name: Option<String>,
    pub item_upc_ean_number: Option<String>,
    pub bullet_features: Option<String>,
    pub catalog_page_number: Option<String>,
    pub drop_ship_only: Option<String>,
    pub msrp_price: Option<String>,
    pub primary_color: Option<String>,
    pub prohibited_states: Option<String>,
    pub vendor_item_no: Option<String>,
    pub year_launched: Option<String>,
    pub prop65_applies: Option<String>,
    pub prop65_cancer_harm: Option<String>,
    pub prop65_reproductive_harm: Option<String>,
}

impl ProductDetails {
    /// Applies one specification-table row. Unknown labels are ignored.
    pub fn apply_spec_row(&mut self, label: &str, value: String) {
        let label = label.replace('\n', "");
        let slot = match label.trim() {
            "Brand Name" => &mut self.brand_name,
            "Item UPC/EAN Number" => &mut self.item_upc_ean_number,
            "BulletFeatures" => &mut self.bullet_features,
            "Catalog Page Number" => &mut self.catalog_page_number,
            "Drop Ship Only" => &mut self.drop_ship_only,
            "MSRP Price" => &mut self.msrp_price,
            "Primary Color" => &mut self.primary_color,
            "ProhibitedStates" => &mut self.prohibited_states,
            "Vendor Item No." => &mut self.vendor_item_no,
            "Year Launched" => &mut self.year_launched,
            "Prop65Applies" => &mut self.prop65_applies,
            "Prop65CancerHarm" => &mut self.prop65_cancer_harm,
            "Prop65ReproductiveHarm" => &mut self.prop65_reproductive_harm,
            "Case Pack" => {
                if self.case_pack.as_deref().is_none_or(str::is_empty) {
                    self.case_pack = Some(value);
                }
                return;
            }
            _ => return,
        };
        *slot = Some(value);
    }

    /// True when the page shows an out-of-stock marker.
    pub fn indicates_out_of_stock(&self) -> bool {
        if self.out_of_stock.as_deref().is_some_and(|t| !t.trim().is_empty()) {
            return true;
        }
        self.stock.as_deref().is_some_and(|stock| {
            let s = stock.to_lowercase();
            s.contains("out of stock") || (s.contains('0') && s.contains("stock"))
        })
    }

    fn columns(&self) -> [Option<&str>; 23] {
        [
            self.product_name.as_deref(),
            self.item_number.as_deref(),
            self.product_upc.as_deref(),
            self.vendor_item_number.as_deref(),
            self.case_pack.as_deref(),
            self.description.as_deref(),
            self.price.as_deref(),
            self.msrp_pricing.as_deref(),
            self.stock.as_deref(),
            self.out_of_stock.as_deref(),
            self.brand_name.as_deref(),
            self.item_upc_ean_number.as_deref(),
            self.bullet_features.as_deref(),
            self.catalog_page_number.as_deref(),
            self.drop_ship_only.as_deref(),
            self.msrp_price.as_deref(),
            self.primary_color.as_deref(),
            self.prohibited_states.as_deref(),
            self.vendor_item_no.as_deref(),
            self.year_launched.as_deref(),
            self.prop65_applies.as_deref(),
            self.prop65_cancer_harm.as_deref(),
            self.prop65_reproductive_harm.as_deref(),
        ]
    }
}

/// Immutable result of the post-search extraction step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPage {
    pub url: String,
    pub details: ProductDetails,
    pub add_to_cart: AddToCartState,
    pub out_of_stock: bool,
    pub selection_required: bool,
}

/// One output row. Built once, never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub identifier: String,
    pub verdict: CartVerdict,
    pub url: String,
    pub status: RecordStatus,
    pub message: String,
    pub details: ProductDetails,
    pub snapshot: Option<PathBuf>,
}

impl ResultRecord {
    /// Record for a terminal outcome that carries no product data.
    pub fn terminal(
        identifier: impl Into<String>,
        status: RecordStatus,
        message: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            verdict: CartVerdict::NotApplicable,
            url: url.into(),
            status,
            message: message.into(),
            details: ProductDetails::default(),
            snapshot: None,
        }
    }

    /// Maps an opened product page to its verdict, status and message.
    pub fn from_product_page(identifier: impl Into<String>, page: ProductPage) -> Self {
        let (verdict, status, message) = if page.add_to_cart == AddToCartState::Missing {
            (
                CartVerdict::No,
                RecordStatus::AddToCartNotPresent,
                "Add to Cart button not displayed",
            )
        } else {
            let message = if page.out_of_stock {
                "Out of stock indicator detected"
            } else if page.selection_required {
                "Product requires selection before add to cart"
            } else if page.add_to_cart == AddToCartState::Disabled {
                "Add to Cart is present but disabled"
            } else {
                ""
            };
            (CartVerdict::Yes, RecordStatus::AddToCartPresent, message)
        };

        Self {
            identifier: identifier.into(),
            verdict,
            url: page.url,
            status,
            message: message.to_string(),
            details: page.details,
            snapshot: None,
        }
    }

    #[must_use]
    pub fn with_snapshot(mut self, snapshot: Option<PathBuf>) -> Self {
        self.snapshot = snapshot;
        self
    }

    /// Column values in [`CSV_HEADER`] order. `None` means an empty cell.
    pub fn columns(&self) -> Vec<Option<String>> {
        let mut row = Vec::with_capacity(CSV_HEADER.len());
        row.push(Some(self.identifier.clone()));
        row.push(Some(self.verdict.as_str().to_string()));
        row.push(Some(self.url.clone()));
        row.push(Some(self.status.label().to_string()));
        row.push(Some(self.message.clone()));
        row.extend(self.details.columns().into_iter().map(|c| c.map(str::to_string)));
        row.push(self.snapshot.as_ref().map(|p| p.display().to_string()));
        row
    }
}
