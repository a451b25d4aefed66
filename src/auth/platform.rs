use oso::PolarClass;
use serde::{Deserialize, Serialize};

/// The bid workflow as a whole; role-gated actions are checked against it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Platform {
    id: String,
}

impl Platform {
    pub fn default() -> Self {
        Self {
            id: "platform".into(),
        }
    }
}

impl PolarClass for Platform {
    fn get_polar_class_builder() -> oso::ClassBuilder<Platform> {
        oso::Class::builder()
            .name("Platform")
            .add_attribute_getter("id", |recv: &Platform| recv.id.clone())
            .add_class_method("default", Platform::default)
    }

    fn get_polar_class() -> oso::Class {
        let builder = Platform::get_polar_class_builder();
        builder.build()
    }
}
