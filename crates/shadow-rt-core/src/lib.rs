//! Shadow runtime core types and shared utilities.

pub mod config;
pub mod error;
pub mod host;
pub mod ids;
pub mod site;

pub use config::{SourceFilter, TracerConfig};
pub use error::{Result, ShadowError, SiteLabel};
pub use host::Host;
pub use ids::{ClassVarName, GlobalName, LocalId, PropertyName, SessionId, SiteId};
pub use site::{
    ArgumentCount, ArgumentSlot, Category, CategorySet, ClassVarSlot, SyntaxSite,
    SyntaxSiteBuilder,
};
