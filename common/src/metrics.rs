use metrics::{describe_gauge, gauge};

pub fn component_info_metric(name: &'static str) {
    static NAME: &str = "cherenkov_reco_component_info";

    describe_gauge!(NAME, "Basic information about the component");

    let git_rev = option_env!("GIT_VERSION").unwrap_or("unknown");
    gauge!(NAME, "component" => name, "git_version" => git_rev).set(1);
}

pub mod metric_names {
    use const_format::concatcp;

    pub const METRIC_NAME_PREFIX: &str = "cherenkov_reco_";

    pub const EVENTS_PROCESSED: &str = concatcp!(METRIC_NAME_PREFIX, "events_processed");
    pub const EVENTS_RECONSTRUCTED: &str = concatcp!(METRIC_NAME_PREFIX, "events_reconstructed");
    pub const EVENTS_INVALID: &str = concatcp!(METRIC_NAME_PREFIX, "events_invalid");
    pub const EVENTS_REJECTED: &str = concatcp!(METRIC_NAME_PREFIX, "events_rejected");
    pub const EVENTS_SKIPPED: &str = concatcp!(METRIC_NAME_PREFIX, "events_skipped");
    pub const PEDESTAL_UPDATES: &str = concatcp!(METRIC_NAME_PREFIX, "pedestal_updates");
}

pub mod events_invalid {
    #[derive(Debug, Clone, Eq, Hash, PartialEq)]
    pub enum InvalidKind {
        EmptyMask,
        TooFewPixels,
        ZeroIntensity,
        UndefinedFeature,
    }

    // Label building function
    pub fn get_label(invalid_kind: InvalidKind) -> (&'static str, &'static str) {
        (
            "invalid_kind",
            match invalid_kind {
                InvalidKind::EmptyMask => "empty_mask",
                InvalidKind::TooFewPixels => "too_few_pixels",
                InvalidKind::ZeroIntensity => "zero_intensity",
                InvalidKind::UndefinedFeature => "undefined_feature",
            },
        )
    }
}

pub mod events_skipped {
    #[derive(Debug, Clone, Eq, Hash, PartialEq)]
    pub enum SkipKind {
        TelescopeNotAllowed,
        PedestalEvent,
        Cancelled,
    }

    // Label building function
    pub fn get_label(skip_kind: SkipKind) -> (&'static str, &'static str) {
        (
            "skip_kind",
            match skip_kind {
                SkipKind::TelescopeNotAllowed => "telescope_not_allowed",
                SkipKind::PedestalEvent => "pedestal_event",
                SkipKind::Cancelled => "cancelled",
            },
        )
    }
}
