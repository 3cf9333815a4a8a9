use std::str::FromStr;

use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{unauthorized_error, Error};

/// An authenticated identity as supplied by the identity provider. The role
/// claim is trusted; ownership is still checked per entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Shipper,
    Carrier,
}

impl Role {
    pub fn name(&self) -> String {
        match self {
            Self::Shipper => "shipper".into(),
            Self::Carrier => "carrier".into(),
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shipper" => Ok(Self::Shipper),
            "carrier" => Ok(Self::Carrier),
            _ => Err(unauthorized_error()),
        }
    }
}

impl User {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_shipper(&self) -> bool {
        self.role == Role::Shipper
    }
}

impl PolarClass for User {
    fn get_polar_class_builder() -> oso::ClassBuilder<User> {
        oso::Class::builder()
            .name("User")
            .add_attribute_getter("id", |recv: &User| recv.id.to_string())
            .add_attribute_getter("role", |recv: &User| recv.role.name())
    }

    fn get_polar_class() -> oso::Class {
        let builder = User::get_polar_class_builder();
        builder.build()
    }
}

#[test]
fn role_claims_parse() {
    assert_eq!("shipper".parse::<Role>().unwrap(), Role::Shipper);
    assert_eq!("carrier".parse::<Role>().unwrap(), Role::Carrier);
    assert!("admin".parse::<Role>().unwrap_err().is_unauthorized_error());
}
