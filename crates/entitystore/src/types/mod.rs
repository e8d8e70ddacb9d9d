//! Concrete entity kinds
//!
//! Each kind is a plain serde struct plus an [`Entity`](crate::Entity) impl
//! declaring its indices and references. Field names follow the gateway's
//! JSON payloads.

use crate::entity::Base;

macro_rules! stored_in {
    ($field:ident) => {
        fn base(&self) -> &$crate::entity::Base {
            &self.base
        }

        fn base_mut(&mut self) -> &mut $crate::entity::Base {
            &mut self.base
        }

        fn collection(store: &$crate::store::Store) -> &$crate::collection::Collection<Self> {
            &store.$field
        }
    };
}

mod certificate;
mod consumer;
mod credential;
mod plugin;
mod service;
mod upstream;
mod vault;

pub use certificate::{CaCertificate, Certificate, Sni};
pub use consumer::{Consumer, ConsumerGroup};
pub use credential::{AclGroup, BasicAuth, HmacAuth, JwtSecret, KeyAuth, MtlsAuth, Oauth2Credential};
pub use plugin::Plugin;
pub use service::{Route, Service};
pub use upstream::{Target, Upstream};
pub use vault::Vault;

/// `value`, else the ID, else a placeholder.
fn label(value: Option<&str>, base: &Base) -> String {
    value
        .filter(|v| !v.is_empty())
        .or(base.id.as_deref())
        .unwrap_or("<unnamed>")
        .to_string()
}
