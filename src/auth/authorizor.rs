use oso::{Oso, OsoError, PolarClass};

use crate::auth::{Platform, User};

pub fn new() -> Result<Oso, OsoError> {
    let mut o = Oso::new();

    o.register_class(Platform::get_polar_class())?;
    o.register_class(User::get_polar_class())?;

    o.load_str(include_str!("rules.polar"))?;

    Ok(o)
}

#[test]
fn admin_roles_can_create_bids() {
    let authorizor = new().unwrap();

    for role in ["admin", "superadmin", "system"] {
        let user = User::new("someone", vec![role.into()]);
        let result = authorizor.is_allowed(user, "create_bid", Platform::default());
        assert_eq!(result.unwrap(), true, "role {} should create bids", role);
    }

    let driver = User::new("driver-1", vec!["driver".into()]);
    let result = authorizor.is_allowed(driver, "create_bid", Platform::default());
    assert_eq!(result.unwrap(), false);
}

#[test]
fn only_drivers_confirm_and_list() {
    let authorizor = new().unwrap();

    let driver = User::new("driver-1", vec!["driver".into()]);
    let admin = User::new("admin-1", vec!["admin".into()]);

    for action in ["confirm_bid", "list_bids"] {
        let result = authorizor.is_allowed(driver.clone(), action, Platform::default());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(admin.clone(), action, Platform::default());
        assert_eq!(result.unwrap(), false);
    }
}

#[test]
fn read_is_shared_and_roleless_users_get_nothing() {
    let authorizor = new().unwrap();

    let driver = User::new("driver-1", vec!["driver".into()]);
    let admin = User::new("admin-1", vec!["superadmin".into()]);
    let nobody = User::new("worker-1", vec!["worker".into()]);

    let result = authorizor.is_allowed(driver, "read_bid", Platform::default());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(admin, "read_bid", Platform::default());
    assert_eq!(result.unwrap(), true);

    for action in ["create_bid", "expire_bids", "read_bid", "list_bids", "confirm_bid"] {
        let result = authorizor.is_allowed(nobody.clone(), action, Platform::default());
        assert_eq!(result.unwrap(), false);
    }
}

#[test]
fn system_role_relation() {
    let authorizor = new().unwrap();

    let system = User::new_system_user();

    let result = authorizor.query_rule("has_role", (system.clone(), "system", Platform::default()));
    assert!(result.unwrap().next().unwrap().is_ok());

    let result = authorizor.is_allowed(system, "expire_bids", Platform::default());
    assert_eq!(result.unwrap(), true);
}
