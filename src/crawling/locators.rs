//! Storefront element locators

use crate::infrastructure::browser_driver::Locator;

// Header / search
pub const SEARCH_BOX: Locator = Locator::XPath("//form//input[@id='header-main-search-input']");
pub const SEARCH_BOX_ALT: Locator =
    Locator::Css("input[id*='search'][type='search'], input[id*='search'][type='text']");
pub const RESULT_LINK: Locator = Locator::XPath("//div[@class='product-info']//a[@class='product-name']");

pub const NO_PRODUCTS_BANNERS: [Locator; 3] = [
    Locator::XPath("//*[contains(.,'No products found')]"),
    Locator::XPath("//*[contains(.,'No results')]"),
    Locator::XPath("//*[contains(.,'0 results') or contains(.,'0 Results')]"),
];

// Popups
pub const WELCOME_POPUP: Locator = Locator::XPath("//h2[contains(text(),'Welcome')]");
pub const ACCEPT_ALL: Locator = Locator::XPath("//button[normalize-space(.)='Accept all']");

// Account / login
pub const ACCOUNT_ICON: Locator = Locator::Id("accountWidget");
pub const LOGIN_LINK: Locator =
    Locator::XPath("//button/following-sibling::div//div[@class='account-menu-login']//a");
pub const ALREADY_LOGGED_IN: Locator = Locator::XPath(
    "//button/following-sibling::div[@aria-labelledby='accountWidget']//div[contains(text(),'Welcome')]",
);
pub const LOGOUT: Locator = Locator::XPath(
    "//button/following-sibling::div[@aria-labelledby='accountWidget']//div//a[normalize-space(.)='Log out']",
);
/// Also the session-expired signal on any page
pub const LOGIN_EMAIL: Locator = Locator::Id("loginMail");
pub const LOGIN_PASSWORD: Locator = Locator::Id("loginPassword");
pub const LOGIN_SUBMIT: Locator = Locator::XPath("//div[@class='login-submit']//button");

// Product page
pub const ADD_TO_CART: Locator =
    Locator::XPath("//form[@id='productDetailPageBuyProductForm']//button[@title='Add to Cart']");
pub const VARIANT_SELECT: Locator = Locator::XPath(
    "//form[@id='productDetailPageBuyProductForm']//select|//form[@id='productDetailPageBuyProductForm']//input[@type='radio']",
);
pub const BUY_BOX_SPINNER: Locator = Locator::XPath(
    "//div[contains(@class,'spinner') or contains(@class,'loading') or contains(@class,'spinner-border')]",
);

pub const PRODUCT_NAME: Locator = Locator::XPath("//div[@class='h1 product-name']");
pub const ITEM_NUMBER: Locator = Locator::XPath("//div[@class='product-number']//span");
pub const PRODUCT_UPC: Locator =
    Locator::XPath("//div[@class='product-upc']//span[contains(text(),'UPC')]/following-sibling::span");
pub const VENDOR_ITEM_NUMBER: Locator = Locator::XPath(
    "//div[@class='product-vendor-item-no']//span[contains(text(),'Vendor Item No')]/following-sibling::span",
);
pub const CASE_PACK: Locator =
    Locator::XPath("//div[@class='product-case-pack']//span[contains(text(),'Case Pack')]/following-sibling::span");
pub const DESCRIPTION: Locator = Locator::XPath("//div[@class='product-detail-description-text']");
pub const PRICE: Locator = Locator::XPath("//span[contains(@class,'customer-price')]");
pub const PRICE_FALLBACK: Locator = Locator::XPath(
    "//p[contains(@class,'product-detail-price')]//span[contains(@class,'price') and not(contains(@class,'customer-price'))]",
);
pub const MSRP_PRICING: Locator =
    Locator::XPath("//div[@class='msrp-info']//span[contains(text(),'MSRP Pricing')]/following-sibling::span");
pub const STOCK: Locator =
    Locator::XPath("//div[@class='product-data']//span[@class='product-stock']//span[@class='stock']");
pub const OUT_OF_STOCK: Locator = Locator::XPath(
    "//div[@class='product-data']//span[@class='product-stock']//span[contains(@class,'out-of-stock')]",
);

// Specification table
pub const SPEC_TABLE_BODY: Locator =
    Locator::XPath("//table[contains(@class,'product-detail-properties-table')]/tbody");
pub const SPEC_ROWS: Locator = Locator::XPath(
    "//table[contains(@class,'product-detail-properties-table')]/tbody//tr[contains(@class,'properties-row')]",
);
pub const SPEC_LABEL: Locator = Locator::Css("th.properties-label");
pub const SPEC_VALUE: Locator = Locator::Css("td.properties-value");
