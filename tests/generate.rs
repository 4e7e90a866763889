use std::fs;
use std::path::Path;
use std::process::Command;

use daoforge::codegen::{CodeGenConfig, PythonGenerator};
use daoforge::config::{FeatureToggles, RunConfig};
use daoforge::introspect::{MemoryCatalog, TableFilter};
use daoforge::pipeline::run;

fn catalog() -> MemoryCatalog {
    MemoryCatalog::new()
        .table("accounts")
        .column("id", "bigint", None, false, true, Some("nextval('accounts_id_seq'::regclass)"))
        .column("email", "character varying", Some(120), false, false, None)
        .column("age", "integer", None, true, false, None)
        .column("status", "text", None, false, false, Some("'A'::text"))
        .column("balance", "numeric", Some(10), false, false, None)
        .column("created_by", "text", None, true, false, None)
        .primary_key(&["id"])
        .index("accounts_email_key", true, &["email"])
        .unique("accounts_email_key", &["email"])
        .check("accounts_age_check", "((age >= 0) AND (age <= 150))", &["age"])
        .check(
            "accounts_status_check",
            "(status = ANY (ARRAY['A'::text, 'B'::text, 'C'::text]))",
            &["status"],
        )
        .check("accounts_balance_check", "(balance <= 9999.99)", &["balance"])
        .check("accounts_email_check", "((email)::text ~ '^[^@]+@[^@]+$'::text)", &["email"])
        .done()
        .table("orders")
        .column("id", "integer", None, false, true, Some("nextval('orders_id_seq'::regclass)"))
        .column("account_id", "bigint", None, false, false, None)
        .column("placed_at", "timestamp with time zone", None, false, false, Some("now()"))
        .primary_key(&["id"])
        .foreign_key("account_id", "accounts", "id")
        .done()
        .table("order_items")
        .column("order_id", "integer", None, false, false, None)
        .column("line_no", "smallint", None, false, false, None)
        .column("quantity", "integer", None, false, false, None)
        .primary_key(&["order_id", "line_no"])
        .foreign_key("order_id", "orders", "id")
        .check("order_items_quantity_check", "(quantity >= 1)", &["quantity"])
        .done()
        .table("currencies")
        .column("code", "character(3)", Some(3), false, false, None)
        .column("name", "text", None, false, false, None)
        .primary_key(&["code"])
        .done()
        .table("event_log")
        .column("message", "text", None, false, false, None)
        .column("payload", "jsonb", None, true, false, None)
        .done()
}

fn config(out: &Path) -> RunConfig {
    RunConfig::new("public", CodeGenConfig::new(out.to_path_buf()))
}

fn read(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(name)).unwrap_or_else(|e| panic!("{}: {}", name, e))
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn generates_record_and_dao_for_every_table() {
    let dir = tempfile::tempdir().unwrap();
    let generator = PythonGenerator::new().unwrap();

    let report = run(&mut catalog(), &generator, &config(dir.path())).unwrap();

    assert_eq!(report.tables.len(), 5);
    assert_eq!(report.artifacts, 12);
    assert_eq!(
        file_names(dir.path()),
        vec![
            "__init__.py",
            "_runtime.py",
            "account.py",
            "account_dao.py",
            "currency.py",
            "currency_dao.py",
            "event_log.py",
            "event_log_dao.py",
            "order.py",
            "order_dao.py",
            "order_item.py",
            "order_item_dao.py",
        ]
    );
}

#[test]
fn second_run_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let generator = PythonGenerator::new().unwrap();

    run(&mut catalog(), &generator, &config(dir.path())).unwrap();
    let first: Vec<String> = file_names(dir.path())
        .iter()
        .map(|name| read(dir.path(), name))
        .collect();

    run(&mut catalog(), &generator, &config(dir.path())).unwrap();
    let second: Vec<String> = file_names(dir.path())
        .iter()
        .map(|name| read(dir.path(), name))
        .collect();

    assert_eq!(first, second);
}

#[test]
fn regeneration_overwrites_manual_edits() {
    let dir = tempfile::tempdir().unwrap();
    let generator = PythonGenerator::new().unwrap();
    run(&mut catalog(), &generator, &config(dir.path())).unwrap();

    fs::write(dir.path().join("account.py"), "# hand edited\n").unwrap();
    run(&mut catalog(), &generator, &config(dir.path())).unwrap();

    let record = read(dir.path(), "account.py");
    assert!(!record.contains("hand edited"));
    assert!(record.starts_with("# Generated by daoforge from public.accounts."));
}

#[test]
fn inferred_rules_reach_the_record() {
    let dir = tempfile::tempdir().unwrap();
    let generator = PythonGenerator::new().unwrap();
    run(&mut catalog(), &generator, &config(dir.path())).unwrap();

    let record = read(dir.path(), "account.py");
    assert!(record.contains("AGE_MIN = 0"));
    assert!(record.contains("AGE_MAX = 150"));
    assert!(record.contains("STATUS_ALLOWED = (\"A\", \"B\", \"C\")"));
    assert!(record.contains("BALANCE_MAX = Decimal(\"9999.99\")"));
    assert!(record.contains("EMAIL_MAX_LENGTH = 120"));
    assert!(record.contains("_EMAIL_PATTERN = re.compile(\"^[^@]+@[^@]+$\")"));
    assert!(record.contains("from decimal import Decimal"));

    let items = read(dir.path(), "order_item.py");
    assert!(items.contains("QUANTITY_MIN = 1"));
    assert!(items.contains("if value < OrderItem.QUANTITY_MIN:"));
}

#[test]
fn dao_operations_follow_key_shape() {
    let dir = tempfile::tempdir().unwrap();
    let generator = PythonGenerator::new().unwrap();
    run(&mut catalog(), &generator, &config(dir.path())).unwrap();

    let accounts = read(dir.path(), "account_dao.py");
    assert!(accounts.contains("RETURNING"));
    assert!(accounts.contains("def find_by_created_by("));

    let orders = read(dir.path(), "order_dao.py");
    assert!(orders.contains("def find_by_account_id(self, account_id: int) -> list[Order]:"));

    let items = read(dir.path(), "order_item_dao.py");
    assert!(items.contains("def find_by_pk(self, order_id: int, line_no: int) -> OrderItem | None:"));
    assert!(items.contains("def find_by_order_id("));

    let currencies = read(dir.path(), "currency_dao.py");
    assert!(currencies.contains("if self.exists_by_pk(record.code):"));
    assert!(!currencies.contains("RETURNING"));

    let events = read(dir.path(), "event_log_dao.py");
    assert!(!events.contains("def update("));
    assert!(!events.contains("def delete_by_pk("));
    assert!(!events.contains("def find_by_pk("));
    assert!(events.contains("def find_all(self) -> list[EventLog]:"));
}

#[test]
fn toggles_change_emission() {
    let dir = tempfile::tempdir().unwrap();
    let generator = PythonGenerator::new().unwrap();
    let features = FeatureToggles {
        validation_methods: false,
        constraint_constants: false,
        check_constraints: false,
        unique_constraints: false,
    };
    let config = config(dir.path())
        .with_features(features)
        .with_audit_columns(Vec::new());

    run(&mut catalog(), &generator, &config).unwrap();

    let record = read(dir.path(), "account.py");
    assert!(!record.contains("def validate("));
    assert!(!record.contains("AGE_MIN"));
    assert!(!record.contains("re.compile"));
    assert!(!record.contains("Unique constraints:"));
    // catalog length still applies
    assert!(record.contains("if len(value) > 120:"));

    let dao = read(dir.path(), "account_dao.py");
    assert!(!dao.contains("def find_by_created_by("));
}

#[test]
fn filter_limits_generated_tables() {
    let dir = tempfile::tempdir().unwrap();
    let generator = PythonGenerator::new().unwrap();
    let config = config(dir.path()).with_filter(TableFilter {
        include: Some(vec!["orders".to_string(), "currencies".to_string()]),
        exclude: Some(vec!["currencies".to_string()]),
    });

    let report = run(&mut catalog(), &generator, &config).unwrap();
    assert_eq!(report.tables, vec!["orders"]);

    let init = read(dir.path(), "__init__.py");
    assert!(init.contains("from .order_dao import OrderDao"));
    assert!(!init.contains("Currency"));
}

/// Tables whose names and rules need translating for Python
fn awkward_catalog() -> MemoryCatalog {
    MemoryCatalog::new()
        .table("codes")
        .column("code", "text", None, false, false, None)
        .primary_key(&["code"])
        .check("codes_code_check", "(code ~ '^[[:upper:]]{3}$'::text)", &["code"])
        .done()
        .table("items")
        .column("id", "bigint", None, false, true, Some("nextval('items_id_seq'::regclass)"))
        .column("property", "text", None, true, false, None)
        .column("staticmethod", "text", None, true, false, None)
        .column("label", "text", None, false, false, None)
        .primary_key(&["id"])
        .done()
        .table("limits")
        .column("big", "bigint", None, false, false, None)
        .check("limits_big_check", "(big <= '9007199254740993'::bigint)", &["big"])
        .done()
}

fn python3_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

const IMPORT_CHECK: &str = r#"
import sys
from decimal import Decimal

sys.path.insert(0, sys.argv[1])

import shop
from gen import Code, CodeDao, Item, ItemDao, Limit, LimitDao, ValidationError


def rejects(build):
    try:
        build()
    except ValidationError:
        return True
    return False


Code(code="ABC")
assert rejects(lambda: Code(code="abc")), "lowercase code accepted"

item = Item(property_="x", staticmethod_="y", label="z")
assert item.property_ == "x"
assert item.staticmethod_ == "y"
item.validate()

Limit(big=9007199254740993)
assert rejects(lambda: Limit(big=9007199254740994)), "bound was rounded"

shop.Account(email="a@example.com", balance=Decimal("10.00"))
assert rejects(lambda: shop.Account(email="nope", balance=Decimal("1")))
assert rejects(lambda: shop.Account(email="a@example.com", balance=Decimal("10000")))
print("ok")
"#;

#[test]
fn generated_package_imports_and_validates() {
    if !python3_available() {
        eprintln!("python3 not found, skipping");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let generator = PythonGenerator::new().unwrap();
    run(&mut catalog(), &generator, &config(&dir.path().join("shop"))).unwrap();
    run(&mut awkward_catalog(), &generator, &config(&dir.path().join("gen"))).unwrap();

    let output = Command::new("python3")
        .arg("-c")
        .arg(IMPORT_CHECK)
        .arg(dir.path())
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "ok");
}
