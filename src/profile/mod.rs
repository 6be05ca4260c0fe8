//! Brand profiles ("dossiers"): target identity, credentials, and extraction rules

mod brand;
mod credentials;
mod rules;

pub use brand::BrandProfile;
pub use credentials::{Credential, CredentialStore, EnvCredentialStore, StaticCredentialStore};
pub use rules::{
    is_image_field, is_url_field, ExtractStrategy, ExtractionRules, RawExtractionRules, SelectorRecipe,
    SelectorTarget, TargetKind, TemplateRef, RULES_VERSION,
};
