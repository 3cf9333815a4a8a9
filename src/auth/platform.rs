use oso::PolarClass;

/// The marketplace as a whole. Capabilities that do not hang off an existing
/// entity, such as posting a load or browsing the open market, are granted
/// against it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Platform;

impl PolarClass for Platform {
    fn get_polar_class_builder() -> oso::ClassBuilder<Platform> {
        oso::Class::builder()
            .name("Platform")
            .add_class_method("default", Platform::default)
    }

    fn get_polar_class() -> oso::Class {
        let builder = Platform::get_polar_class_builder();
        builder.build()
    }
}
