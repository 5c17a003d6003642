/// Release builds may stamp `APP_VERSION`; otherwise the crate version is used.
pub const VERSION: &str = match option_env!("APP_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};
