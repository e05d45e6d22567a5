//! End-to-end passes over the reference records, plus properties that span
//! several modules.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use fieldtools::prelude::*;
use fieldtools::{global, install, ApplierRef, ErrorKind, Result, ToolRef, MAX_PRINCIPALS};
use fieldtools_test::prelude::*;
use proptest::prelude::*;

fn catalog() -> Catalog {
    fieldtools_test::catalog().unwrap()
}

fn account() -> Account {
    let mut account = Account::default();
    account.email = "ada@example.com".into();
    account.plan = "pro".into();
    account.balance = 40;
    account.secret = "s3cret".into();
    account.owner = "ada".into();
    account
}

// ═══════════════════════════════════════════════════════════════════════════════
// Defaults
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn widget_defaults() {
    let catalog = catalog();
    let mut widget = Widget::default();
    catalog.apply_defaults(&mut widget, &mut ToolContext::new()).unwrap();
    assert_eq!(
        widget,
        Widget {
            color: "orange".into(),
            label: "123".into(),
            size: 123,
        }
    );
}

#[test]
fn scoped_defaults_pick_the_active_scope() {
    record! {
        #[derive(Debug, Default)]
        pub struct Limits {
            pub quota: i64 [default = "create:=10;*:=5"],
        }
    }
    let catalog = catalog();

    let mut limits = Limits::default();
    catalog.apply_defaults(&mut limits, &mut ToolContext::for_scope("create")).unwrap();
    assert_eq!(limits.quota, 10);

    // the alias resolves before matching
    let mut limits = Limits::default();
    catalog.apply_defaults(&mut limits, &mut ToolContext::for_scope("post")).unwrap();
    assert_eq!(limits.quota, 10);

    let mut limits = Limits::default();
    catalog.apply_defaults(&mut limits, &mut ToolContext::for_scope("update")).unwrap();
    assert_eq!(limits.quota, 5);
}

#[test]
fn bypass_keeps_set_values() {
    let catalog = catalog();
    let mut account = account();
    account.id = "acc-7".into();
    account.address.city = "Shelbyville".into();
    catalog.apply_defaults(&mut account, &mut ToolContext::for_scope("update")).unwrap();
    assert_eq!(account.id, "acc-7");
    assert_eq!(account.address.city, "Shelbyville");
    assert_eq!(account.plan, "pro");
    // create-only default does not run on update
    assert_eq!(account.audit.created_by, "");
}

// ═══════════════════════════════════════════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn validation_reports_every_failing_field() {
    let catalog = catalog();
    let mut account = Account::default();
    account.email = "not an email".into();
    account.plan = "gold".into();
    account.balance = -1;
    let err = catalog.validate(&mut account, &mut ToolContext::for_scope("update")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let mut locations: Vec<_> = err.flatten().into_iter().filter_map(Error::location).collect();
    locations.sort_unstable();
    assert_eq!(locations, ["balance", "email", "plan"]);

    for error in err.flatten() {
        let Error::Validation { scope, .. } = error else {
            panic!("expected a validation error, got {error:?}");
        };
        assert_eq!(scope, "update");
    }
}

#[test]
fn valid_account_passes() {
    let catalog = catalog();
    catalog.validate(&mut account(), &mut ToolContext::new()).unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// Access
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn support_cannot_update_owned_fields() {
    let catalog = catalog();
    let mut account = account();
    catalog
        .remove_non_writable(&mut account, &Principal::from("support"), AccessKind::UPDATE)
        .unwrap();
    assert_eq!(account.email, "");
    assert_eq!(account.plan, "");
    assert_eq!(account.balance, 0);
    assert_eq!(account.secret, "");
    // provided
    assert_eq!(account.owner, "ada");
}

#[test]
fn billing_may_update_balance_only() {
    let catalog = catalog();
    let mut account = account();
    catalog
        .remove_non_writable(&mut account, &Principal::from("billing"), AccessKind::UPDATE)
        .unwrap();
    assert_eq!(account.balance, 40);
    assert_eq!(account.email, "");
    assert_eq!(account.secret, "");
}

#[test]
fn read_write_all_keeps_everything() {
    let catalog = catalog();
    let mut account = account();
    catalog
        .remove_non_writable(&mut account, &Principal::ReadWriteAll, AccessKind::WRITE)
        .unwrap();
    assert_eq!(account, self::account());
}

#[test]
fn projection_follows_read_bits() {
    let catalog = catalog();
    let account = account();

    let support = catalog.project_readable(&account, &Principal::from("support")).unwrap();
    assert_eq!(support.get("email"), Some(&Value::from("ada@example.com")));
    assert!(support.contains_key("owner"));
    assert!(!support.contains_key("secret"));
    // untagged
    assert!(support.contains_key("accountId"));

    let owner = catalog.project_readable(&account, &Principal::from("owner")).unwrap();
    assert!(owner.contains_key("secret"));
    assert!(!owner.contains_key("owner"));

    let nobody = catalog.project_readable(&account, &Principal::NoAccess).unwrap();
    assert!(!nobody.contains_key("email"));
    assert!(nobody.contains_key("accountId"));
}

#[test]
fn copy_provided_restores_caller_fields() {
    let catalog = catalog();
    let current = account();
    let mut update = Account::default();
    catalog.copy_provided(&current, &mut update).unwrap();
    assert_eq!(update.owner, "ada");
    assert_eq!(update.email, "");

    let err = catalog.copy_provided(&current, &mut Widget::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Principals
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn principal_limit() {
    let names: Vec<String> = (0..MAX_PRINCIPALS).map(|i| format!("p{i}")).collect();
    let builder = CatalogBuilder::new().register_access_principals(names).unwrap();
    let err = builder.register_access_principals(["eighth"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn reserved_principals_are_rejected() {
    for name in ["ReadWriteAll", "ReadAll", "NoAccess"] {
        let err = CatalogBuilder::new().register_access_principals([name]).unwrap_err();
        assert!(err.to_string().contains("reserved"), "{err}");
    }
}

#[test]
fn later_registrations_get_fresh_positions() {
    let catalog = CatalogBuilder::new()
        .register_access_principals(["a", "b"])
        .unwrap()
        .register_access_principals(["a", "c"])
        .unwrap()
        .build();
    let principals = catalog.principals();
    assert_eq!(principals.names(), ["a", "b", "c"]);
    assert_eq!(principals.position("a"), Some(0));
    assert_eq!(principals.position("c"), Some(2));

    let spec = principals.parse_tag("--,--,rw").unwrap();
    assert!(principals.allows(spec.mask, &Principal::from("c"), AccessKind::CREATE));
    assert!(!principals.allows(spec.mask, &Principal::from("b"), AccessKind::READ));
}

#[test]
fn process_wide_catalog_installs_once() {
    install(catalog()).unwrap();
    assert_eq!(global().principals().position("support"), Some(1));
    assert!(global().function("$color").is_some());
    let err = install(catalog()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Introspection
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct Counting(Arc<AtomicUsize>);

impl Tool for Counting {
    fn name(&self) -> &str {
        "count"
    }

    fn applier(&self, _: &Catalog, _: &FieldInfo, directive: Option<&str>) -> Result<Option<ApplierRef>> {
        if directive.is_none() {
            return Ok(None);
        }
        self.0.fetch_add(1, Ordering::SeqCst);
        let noop = |_: &mut dyn Record, _: &FieldInfo, _: &mut ToolContext| -> Result<()> { Ok(()) };
        Ok(Some(Arc::new(noop)))
    }
}

record! {
    #[derive(Debug, Default)]
    pub struct Counted {
        pub n: i64 [count = "yes"],
    }
}

#[test]
fn concurrent_introspection_builds_once() {
    const THREADS: usize = 8;

    let built = Arc::new(AtomicUsize::new(0));
    let catalog = Arc::new(
        CatalogBuilder::new()
            .tag_to_field_tool_associations([("count", Some(Arc::new(Counting(Arc::clone(&built))) as ToolRef))])
            .build(),
    );
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let catalog = Arc::clone(&catalog);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                catalog.introspect::<Counted>().unwrap()
            })
        })
        .collect();
    let tables: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert!(tables.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(catalog.cached_types(), 1);
}

#[test]
fn failed_introspection_is_reported_again() {
    record! {
        #[derive(Debug, Default)]
        pub struct Broken {
            pub a: String [default = "$nope"],
            pub b: i64 [default = "=not-a-number"],
            pub c: String [validate = "len(1"],
        }
    }
    let catalog = catalog();
    for _ in 0..2 {
        let err = catalog.introspect::<Broken>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        let mut locations: Vec<_> = err.flatten().into_iter().filter_map(Error::location).collect();
        locations.sort_unstable();
        assert_eq!(locations, ["a", "b", "c"]);
    }
    assert_eq!(catalog.cached_types(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Properties
// ═══════════════════════════════════════════════════════════════════════════════

fn pair(read: bool, write: u8) -> String {
    let r = if read { 'r' } else { '-' };
    let w = ['-', 'c', 'u', 'w'][usize::from(write % 4)];
    format!("{r}{w}")
}

fn kinds(read: bool, write: u8) -> AccessKind {
    let r = if read { AccessKind::READ } else { AccessKind::NONE };
    let w = [AccessKind::NONE, AccessKind::CREATE, AccessKind::UPDATE, AccessKind::WRITE][usize::from(write % 4)];
    r | w
}

proptest! {
    #[test]
    fn access_tags_round_trip(grants in prop::collection::vec((any::<bool>(), 0u8..4), 3)) {
        let catalog = catalog();
        let tag: String = grants.iter().map(|&(r, w)| pair(r, w)).collect();
        let spec = catalog.principals().parse_tag(&tag).unwrap();
        for (&(r, w), name) in grants.iter().zip(PRINCIPALS) {
            let principal = Principal::from(name);
            let expected = kinds(r, w);
            for kind in [AccessKind::READ, AccessKind::CREATE, AccessKind::UPDATE] {
                prop_assert_eq!(
                    catalog.principals().allows(spec.mask, &principal, kind),
                    expected.contains(kind)
                );
            }
        }
    }

    #[test]
    fn length_bounds_are_inclusive(text in "[a-z]{0,12}", lo in 0usize..8, span in 0usize..8) {
        let hi = lo + span;
        let c = catalog().constraint(&format!("len({lo},{hi})")).unwrap();
        let n = text.chars().count();
        prop_assert_eq!(c.test(&Value::from(text.as_str())), n >= lo && n <= hi);
    }
}
