//! Product page capture
//!
//! Waits for the buy box to settle, then reads every product field as a raw
//! string. Returns an immutable [`ProductPage`]; nothing is cached between
//! calls. Missing fields are `None`; only session loss fails the extraction.

use std::time::Duration;

use tracing::debug;

use crate::crawling::locators;
use crate::domain::errors::ItemError;
use crate::domain::outcome::AddToCartState;
use crate::domain::result_record::{ProductDetails, ProductPage};
use crate::infrastructure::browser_driver::{BrowserSession, DriverResult, Locator, best_effort};
use crate::infrastructure::config::TimingConfig;
use crate::infrastructure::wait::{find_visible, wait_invisible, wait_text_not_empty};

/// Reads product pages
#[derive(Debug, Clone)]
pub struct ProductExtractor {
    timing: TimingConfig,
}

impl ProductExtractor {
    pub const fn new(timing: TimingConfig) -> Self {
        Self { timing }
    }

    pub async fn extract<S>(&self, session: &mut S) -> Result<ProductPage, ItemError>
    where
        S: BrowserSession + ?Sized,
    {
        self.stabilize(session).await?;

        let details = self.read_details(session).await?;
        let add_to_cart = add_to_cart_state(session).await?;
        let selection_required = selection_required(session).await?;
        let out_of_stock = details.indicates_out_of_stock();
        let url = best_effort(session.current_url().await)?;

        debug!(
            "🛒 Extracted {:?}: add_to_cart={:?} out_of_stock={} selection_required={}",
            details.product_name, add_to_cart, out_of_stock, selection_required
        );

        Ok(ProductPage {
            url,
            details,
            add_to_cart,
            out_of_stock,
            selection_required,
        })
    }

    /// Spinner gone, price and stock text populated (each bounded).
    async fn stabilize<S>(&self, session: &mut S) -> DriverResult<()>
    where
        S: BrowserSession + ?Sized,
    {
        let tick = self.timing.poll_interval();
        if !wait_invisible(session, locators::BUY_BOX_SPINNER, self.timing.spinner_timeout(), tick).await? {
            debug!("Buy box spinner still visible after {:?}", self.timing.spinner_timeout());
        }
        wait_text_not_empty(session, locators::PRICE, self.timing.price_wait(), tick).await?;
        wait_text_not_empty(session, locators::STOCK, self.timing.stock_wait(), tick).await?;
        Ok(())
    }

    async fn field<S>(&self, session: &mut S, locator: Locator, timeout: Duration) -> DriverResult<Option<String>>
    where
        S: BrowserSession + ?Sized,
    {
        let Some(element) = find_visible(session, locator, timeout, self.timing.poll_interval()).await? else {
            return Ok(None);
        };
        let text = best_effort(session.read_text(&element).await)?;
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }

    async fn read_details<S>(&self, session: &mut S) -> DriverResult<ProductDetails>
    where
        S: BrowserSession + ?Sized,
    {
        let (long, short) = (self.timing.field_timeout(), self.timing.short_field_timeout());

        let mut details = ProductDetails {
            product_name: self.field(session, locators::PRODUCT_NAME, long).await?,
            item_number: self.field(session, locators::ITEM_NUMBER, long).await?,
            product_upc: self.field(session, locators::PRODUCT_UPC, long).await?,
            vendor_item_number: self.field(session, locators::VENDOR_ITEM_NUMBER, long).await?,
            case_pack: self.field(session, locators::CASE_PACK, long).await?,
            description: self.field(session, locators::DESCRIPTION, long).await?,
            price: self.field(session, locators::PRICE, short).await?,
            msrp_pricing: self.field(session, locators::MSRP_PRICING, long).await?,
            stock: self.field(session, locators::STOCK, short).await?,
            out_of_stock: self.field(session, locators::OUT_OF_STOCK, short).await?,
            ..ProductDetails::default()
        };
        if details.price.is_none() {
            details.price = self.field(session, locators::PRICE_FALLBACK, short).await?;
        }

        self.read_spec_table(session, &mut details).await?;
        Ok(details)
    }

    async fn read_spec_table<S>(&self, session: &mut S, details: &mut ProductDetails) -> DriverResult<()>
    where
        S: BrowserSession + ?Sized,
    {
        let table = find_visible(
            session,
            locators::SPEC_TABLE_BODY,
            self.timing.spec_table_timeout(),
            self.timing.poll_interval(),
        )
        .await?;
        if table.is_none() {
            return Ok(());
        }

        for row in best_effort(session.find_all(locators::SPEC_ROWS).await)? {
            let label = best_effort(session.find_within(&row, locators::SPEC_LABEL).await)?;
            let value = best_effort(session.find_within(&row, locators::SPEC_VALUE).await)?;
            let (Some(label), Some(value)) = (label, value) else {
                continue;
            };
            let label = best_effort(session.read_text(&label).await)?;
            let value = best_effort(session.read_text(&value).await)?;
            details.apply_spec_row(label.trim(), value.trim().to_string());
        }
        Ok(())
    }
}

async fn add_to_cart_state<S>(session: &mut S) -> DriverResult<AddToCartState>
where
    S: BrowserSession + ?Sized,
{
    let buttons = best_effort(session.find_all(locators::ADD_TO_CART).await)?;
    let Some(button) = buttons.first() else {
        return Ok(AddToCartState::Missing);
    };
    if !best_effort(session.is_displayed(button).await)? {
        return Ok(AddToCartState::Missing);
    }

    let aria_disabled = best_effort(session.attribute(button, "aria-disabled").await)?;
    let disabled_attr = best_effort(session.attribute(button, "disabled").await)?;
    let enabled = match session.is_enabled(button).await {
        Ok(enabled) => enabled,
        Err(e) if e.is_session_invalid() => return Err(e),
        Err(_) => true,
    };

    let disabled = aria_disabled.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
        || disabled_attr.is_some()
        || !enabled;
    Ok(if disabled {
        AddToCartState::Disabled
    } else {
        AddToCartState::Enabled
    })
}

async fn selection_required<S>(session: &mut S) -> DriverResult<bool>
where
    S: BrowserSession + ?Sized,
{
    for variant in best_effort(session.find_all(locators::VARIANT_SELECT).await)? {
        if best_effort(session.is_displayed(&variant).await)? && best_effort(session.is_enabled(&variant).await)? {
            return Ok(true);
        }
    }

    let Some(button) = best_effort(session.find_all(locators::ADD_TO_CART).await)?.into_iter().next() else {
        return Ok(false);
    };
    let text = best_effort(session.read_text(&button).await)?.to_lowercase();
    Ok(text.contains("select") && text.contains("option"))
}
