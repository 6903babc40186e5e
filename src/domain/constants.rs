//! Host-site characteristics and domain constants.
//!
//! Everything that is a fixed property of the managed ads-manager pages
//! (URL shapes, query parameter names) lives here, away from tunable
//! configuration.

/// Managed application URL characteristics.
pub mod site {
    /// Substring that identifies a page as part of the managed application.
    pub const MANAGED_PATH: &str = "facebook.com/adsmanager";

    /// Path fragment of the top-level campaigns list view.
    pub const CAMPAIGNS_PATH: &str = "/adsmanager/manage/campaigns";

    /// Path fragment of the ad sets list view.
    pub const ADSETS_PATH: &str = "/adsmanager/manage/adsets";

    /// Path fragment of the ads list view.
    pub const ADS_PATH: &str = "/adsmanager/manage/ads";
}

/// URL query parameters carrying page context.
pub mod query {
    /// Ad account id.
    pub const ACCOUNT_ID: &str = "act";

    /// Parent campaign selection, present on ad-set and ad views.
    pub const SELECTED_CAMPAIGN_IDS: &str = "selected_campaign_ids";

    /// Parent ad-set selection, present on ad views.
    pub const SELECTED_ADSET_IDS: &str = "selected_adset_ids";
}
