//! Identifiers for tenants, file records and the entities files attach to.
//!
//! All three are bare UUIDs on the wire and in Postgres. Wrapping them keeps
//! a tenant scope from being passed where a file lookup key is expected, a
//! mix-up that would otherwise compile and silently match nothing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID newtype serialized as the plain UUID string.
macro_rules! entity_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generates a fresh UUID v7, so newer records sort after older ones.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wraps a UUID read from a row or a request.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Unwraps to the UUID stored in the database column.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }

            /// The all-zero UUID; rejected wherever a tenant or owner is required.
            #[must_use]
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

entity_id!(
    TenantId,
    "Tenant resolved from `X-Tenant-Id`. Every record read or write is scoped by it."
);
entity_id!(
    FileId,
    "Primary key of a file record. Independent of the blob's storage key."
);
entity_id!(
    OwnerId,
    "Entity in a caller's domain that an attached file belongs to, paired with an owner type."
);

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
