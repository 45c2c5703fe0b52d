//! # Database Scenario Tests
//!
//! End-to-end behaviour of the class layer over real stores: round trips,
//! commit/rollback, journaling, link integrity, keys, filtering and pack.

#![allow(clippy::unwrap_used, clippy::panic)]

use hyperdb_core::{
    ClassDef, Config, Database, Date, EngineKind, FilterSpec, HyperdbError, Interval,
    JournalAction, JournalParams, Password, PropertyType, SortKey, Value,
};
use std::path::Path;
use tempfile::tempdir;

// =============================================================================
// FIXTURES
// =============================================================================

fn schema(db: &mut Database) {
    db.addclass(
        ClassDef::new("status")
            .with_property("name", PropertyType::String)
            .with_property("order", PropertyType::Number)
            .with_key("name"),
    )
    .expect("status");
    db.addclass(
        ClassDef::new("user")
            .with_property("username", PropertyType::String)
            .with_property("password", PropertyType::Password)
            .with_key("username"),
    )
    .expect("user");
    db.addclass(
        ClassDef::new("issue")
            .with_property("title", PropertyType::String)
            .with_property("status", PropertyType::link("status"))
            .with_property("assignedto", PropertyType::link("user"))
            .with_property("nosy", PropertyType::multilink("user"))
            .with_property(
                "watchers",
                PropertyType::Multilink {
                    class: "user".to_string(),
                    journal: false,
                },
            )
            .with_property("deadline", PropertyType::Date)
            .with_property("estimate", PropertyType::Interval)
            .with_property("priority", PropertyType::Number)
            .with_property("urgent", PropertyType::Boolean),
    )
    .expect("issue");
    db.addclass(ClassDef::file("file").with_property("name", PropertyType::String))
        .expect("file");
}

fn open_with(dir: &Path, engine: Option<EngineKind>) -> Database {
    let mut config = Config::new(dir).with_journal_tag("admin");
    if let Some(engine) = engine {
        config = config.with_engine(engine);
    }
    let mut db = Database::open(config).expect("open");
    schema(&mut db);
    db
}

fn open(dir: &Path) -> Database {
    open_with(dir, None)
}

fn open_read_only(dir: &Path) -> Database {
    let mut db = Database::open(Config::new(dir)).expect("open read-only");
    schema(&mut db);
    db
}

/// Two statuses and two users, committed.
fn seed(db: &mut Database) {
    for name in ["unread", "resolved"] {
        db.getclass("status")
            .expect("status")
            .create([("name", Value::from(name))])
            .expect("create status");
    }
    for name in ["alice", "bob"] {
        db.getclass("user")
            .expect("user")
            .create([("username", Value::from(name))])
            .expect("create user");
    }
    db.commit().expect("commit seed");
}

fn get(db: &mut Database, class: &str, id: &str, prop: &str) -> Option<Value> {
    db.getclass(class).expect("class").get(id, prop).expect("get")
}

// =============================================================================
// ROUND TRIP
// =============================================================================

mod round_trip {
    use super::*;

    #[test]
    fn create_then_get_returns_supplied_values() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);

        let deadline = Date::parse("2003-02-16.08:30:00").expect("date");
        let estimate = Interval::parse("1d 2:00").expect("interval");
        let id = db
            .getclass("issue")
            .expect("issue")
            .create([
                ("title", Value::from("spam")),
                ("status", Value::link("1")),
                ("nosy", Value::multilink(["2", "1"])),
                ("deadline", Value::from(deadline)),
                ("estimate", Value::from(estimate)),
                ("priority", Value::from(3)),
                ("urgent", Value::from(true)),
            ])
            .expect("create");
        assert_eq!(id, "1");

        for committed in [false, true] {
            if committed {
                db.commit().expect("commit");
            }
            assert_eq!(get(&mut db, "issue", "1", "title"), Some(Value::from("spam")));
            assert_eq!(get(&mut db, "issue", "1", "status"), Some(Value::link("1")));
            assert_eq!(
                get(&mut db, "issue", "1", "nosy"),
                Some(Value::multilink(["1", "2"]))
            );
            assert_eq!(get(&mut db, "issue", "1", "deadline"), Some(Value::Date(deadline)));
            assert_eq!(get(&mut db, "issue", "1", "estimate"), Some(Value::Interval(estimate)));
            assert_eq!(get(&mut db, "issue", "1", "priority"), Some(Value::Number(3.0)));
            assert_eq!(get(&mut db, "issue", "1", "urgent"), Some(Value::Boolean(true)));
        }
    }

    #[test]
    fn values_survive_reopen() {
        let temp = tempdir().expect("temp dir");
        {
            let mut db = open(temp.path());
            db.getclass("user")
                .expect("user")
                .create([
                    ("username", Value::from("alice")),
                    ("password", Value::from(Password::new("sekrit"))),
                ])
                .expect("create");
            db.commit().expect("commit");
        }
        let mut db = open_read_only(temp.path());
        match get(&mut db, "user", "1", "password") {
            Some(Value::Password(p)) => {
                assert!(p.matches("sekrit"));
                assert!(!p.matches("guess"));
            }
            other => panic!("expected password, got {:?}", other),
        }
        assert_eq!(get(&mut db, "user", "1", "username"), Some(Value::from("alice")));
    }

    #[test]
    fn unset_properties_take_defaults() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        db.getclass("issue")
            .expect("issue")
            .create([("title", Value::from("spam"))])
            .expect("create");
        assert_eq!(get(&mut db, "issue", "1", "status"), None);
        assert_eq!(get(&mut db, "issue", "1", "nosy"), Some(Value::Multilink(vec![])));
        assert_eq!(get(&mut db, "issue", "1", "priority"), None);
    }

    #[test]
    fn implicit_properties_are_stamped() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        db.getclass("issue")
            .expect("issue")
            .create([("title", Value::from("spam"))])
            .expect("create");
        let node = db.getclass("issue").expect("issue").getnode("1").expect("node");
        assert_eq!(node.get("id"), Some(&Value::from("1")));
        assert_eq!(node.get("creator"), Some(&Value::from("admin")));
        assert_eq!(node.get("actor"), Some(&Value::from("admin")));
        assert!(matches!(node.get("creation"), Some(Value::Date(_))));
        assert_eq!(node.get("creation"), node.get("activity"));
        assert!(!node.retired);
    }

    #[test]
    fn file_content_lives_in_blob_store() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        db.getclass("file")
            .expect("file")
            .create([
                ("name", Value::from("notes.txt")),
                ("content", Value::from("hello world")),
            ])
            .expect("create");
        assert_eq!(
            get(&mut db, "file", "1", "content"),
            Some(Value::from("hello world"))
        );
        db.commit().expect("commit");
        assert!(temp.path().join("files").join("file").join("file1").is_file());

        let mut db = open_read_only(temp.path());
        assert_eq!(
            get(&mut db, "file", "1", "content"),
            Some(Value::from("hello world"))
        );
        let history = db.getclass("file").expect("file").history("1").expect("history");
        match &history[0].params {
            JournalParams::Properties(props) => assert!(!props.contains_key("content")),
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[test]
    fn non_utf8_content_is_value_error() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        db.getclass("file")
            .expect("file")
            .create([
                ("name", Value::from("image.bin")),
                ("content", Value::from("placeholder")),
            ])
            .expect("create");
        db.commit().expect("commit");
        let blob = temp.path().join("files").join("file").join("file1");
        std::fs::write(&blob, [0xff, 0xfe, 0x00, 0x80]).expect("overwrite blob");

        let mut db = open_read_only(temp.path());
        let mut file = db.getclass("file").expect("file");
        assert!(matches!(file.get("1", "content"), Err(HyperdbError::Value(_))));
        assert!(matches!(file.getnode("1"), Err(HyperdbError::Value(_))));
        assert_eq!(
            file.get("1", "name").expect("name"),
            Some(Value::from("image.bin"))
        );
        assert_eq!(std::fs::read(&blob).expect("blob"), vec![0xff, 0xfe, 0x00, 0x80]);
    }
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

mod transactions {
    use super::*;

    #[test]
    fn rollback_restores_previous_state() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        db.getclass("issue")
            .expect("issue")
            .create([("title", Value::from("spam"))])
            .expect("create");
        db.commit().expect("commit");

        {
            let mut issue = db.getclass("issue").expect("issue");
            issue.create([("title", Value::from("eggs"))]).expect("create");
            issue.set("1", [("title", Value::from("ham"))]).expect("set");
            assert_eq!(issue.list().expect("list"), vec!["1", "2"]);
        }
        assert!(db.pending() > 0);
        db.rollback();

        assert_eq!(db.pending(), 0);
        assert_eq!(db.getclass("issue").expect("issue").list().expect("list"), vec!["1"]);
        assert_eq!(get(&mut db, "issue", "1", "title"), Some(Value::from("spam")));
        let history = db.getclass("issue").expect("issue").history("1").expect("history");
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn rollback_leaves_blobs_untouched() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        db.getclass("file")
            .expect("file")
            .create([("content", Value::from("draft"))])
            .expect("create");
        db.rollback();
        assert!(!temp.path().join("files").join("file").join("file1").exists());
    }

    #[test]
    fn second_commit_is_a_no_op() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        db.commit().expect("empty commit");
        assert_eq!(db.getclass("status").expect("status").list().expect("list"), vec!["1", "2"]);
    }

    #[test]
    fn staged_changes_invisible_to_other_handles() {
        let temp = tempdir().expect("temp dir");
        let mut writer = open(temp.path());
        seed(&mut writer);
        writer
            .getclass("status")
            .expect("status")
            .create([("name", Value::from("chatting"))])
            .expect("create");

        let mut reader = open_read_only(temp.path());
        assert_eq!(reader.getclass("status").expect("status").count().expect("count"), 2);

        writer.commit().expect("commit");
        let mut reader = open_read_only(temp.path());
        assert_eq!(reader.getclass("status").expect("status").count().expect("count"), 3);
    }

    #[test]
    fn ids_never_collide_across_handles() {
        let temp = tempdir().expect("temp dir");
        let mut first = open(temp.path());
        let mut second = open(temp.path());
        let a = first
            .getclass("status")
            .expect("status")
            .create([("name", Value::from("a"))])
            .expect("create");
        let b = second
            .getclass("status")
            .expect("status")
            .create([("name", Value::from("b"))])
            .expect("create");
        assert_ne!(a, b);
    }

    #[test]
    fn read_only_handle_rejects_writes() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        let mut db = open_read_only(temp.path());
        let mut status = db.getclass("status").expect("status");
        assert!(matches!(
            status.create([("name", Value::from("x"))]),
            Err(HyperdbError::Database(_))
        ));
        assert!(matches!(status.retire("1"), Err(HyperdbError::Database(_))));
        assert!(matches!(
            status.set("1", [("name", Value::from("x"))]),
            Err(HyperdbError::Database(_))
        ));
        assert_eq!(status.list().expect("list"), vec!["1", "2"]);
    }
}

// =============================================================================
// JOURNAL
// =============================================================================

mod journal {
    use super::*;

    #[test]
    fn history_has_create_plus_one_entry_per_set() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        {
            let mut issue = db.getclass("issue").expect("issue");
            issue.create([("title", Value::from("spam"))]).expect("create");
            issue.set("1", [("title", Value::from("eggs"))]).expect("set");
            issue.set("1", [("priority", Value::from(2))]).expect("set");
            issue.set("1", [("status", Value::link("2"))]).expect("set");
        }
        db.commit().expect("commit");

        let history = db.getclass("issue").expect("issue").history("1").expect("history");
        let actions: Vec<JournalAction> = history.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                JournalAction::Create,
                JournalAction::Set,
                JournalAction::Set,
                JournalAction::Set
            ]
        );
        let old = |i: usize, prop: &str| match &history[i].params {
            JournalParams::Properties(props) => props.get(prop).cloned(),
            other => panic!("unexpected params {:?}", other),
        };
        assert_eq!(old(1, "title"), Some(Some(Value::from("spam"))));
        assert_eq!(old(2, "priority"), Some(None));
        assert_eq!(old(3, "status"), Some(None));
        assert!(history.iter().all(|e| e.tag == "admin" && e.nodeid == "1"));
    }

    #[test]
    fn unchanged_set_journals_nothing() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        let mut issue = db.getclass("issue").expect("issue");
        issue.create([("title", Value::from("spam"))]).expect("create");
        issue.set("1", [("title", Value::from("spam"))]).expect("set");
        assert_eq!(issue.history("1").expect("history").len(), 1);
    }

    #[test]
    fn multilink_set_journals_link_on_target() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        {
            let mut issue = db.getclass("issue").expect("issue");
            issue
                .create([
                    ("title", Value::from("spam")),
                    ("nosy", Value::multilink(["1"])),
                ])
                .expect("create");
            issue
                .set("1", [("nosy", Value::multilink(["1", "2"]))])
                .expect("set");
        }
        db.commit().expect("commit");

        let journal = db.getjournal("user", "2").expect("journal");
        let link = journal
            .iter()
            .find(|e| e.action == JournalAction::Link)
            .expect("link entry");
        assert_eq!(
            link.params,
            JournalParams::Link {
                classname: "issue".to_string(),
                nodeid: "1".to_string(),
                property: "nosy".to_string(),
            }
        );

        let user1: Vec<JournalAction> = db
            .getjournal("user", "1")
            .expect("journal")
            .iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(user1, vec![JournalAction::Create, JournalAction::Link]);
    }

    #[test]
    fn link_change_journals_unlink_then_link() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        {
            let mut issue = db.getclass("issue").expect("issue");
            issue.create([("assignedto", Value::link("1"))]).expect("create");
            issue.set("1", [("assignedto", Value::link("2"))]).expect("set");
        }
        let last = |db: &Database, id: &str| {
            db.getjournal("user", id)
                .expect("journal")
                .last()
                .map(|e| e.action)
        };
        assert_eq!(last(&db, "1"), Some(JournalAction::Unlink));
        assert_eq!(last(&db, "2"), Some(JournalAction::Link));
    }

    #[test]
    fn unjournaled_links_leave_targets_alone() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        db.getclass("issue")
            .expect("issue")
            .create([("watchers", Value::multilink(["1", "2"]))])
            .expect("create");
        assert_eq!(db.getjournal("user", "1").expect("journal").len(), 1);
    }

    #[test]
    fn retire_and_restore_are_journaled() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        let mut status = db.getclass("status").expect("status");
        status.retire("1").expect("retire");
        status.retire("1").expect("retire again");
        status.restore("1").expect("restore");
        let actions: Vec<JournalAction> = status
            .history("1")
            .expect("history")
            .iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(
            actions,
            vec![JournalAction::Create, JournalAction::Retire, JournalAction::Restore]
        );
    }

    #[test]
    fn history_of_missing_node_is_index_error() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        assert!(matches!(
            db.getclass("issue").expect("issue").history("7"),
            Err(HyperdbError::Index(_))
        ));
    }

    #[test]
    fn pack_keeps_create_and_latest_set() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        db.getclass("issue")
            .expect("issue")
            .create([("status", Value::link("1"))])
            .expect("create");
        db.commit().expect("commit");
        for status in ["2", "1"] {
            db.getclass("issue")
                .expect("issue")
                .set("1", [("status", Value::link(status))])
                .expect("set");
            db.commit().expect("commit");
        }
        let before = db.getjournal("issue", "1").expect("journal");
        assert_eq!(before.len(), 3);

        let cutoff = Date::now()
            .plus(&Interval::parse("1d").expect("interval"))
            .expect("cutoff");
        let removed = db.pack(&cutoff).expect("pack");
        assert!(removed >= 1);

        let after = db.getjournal("issue", "1").expect("journal");
        assert!(after.len() < before.len());
        assert_eq!(after.first().map(|e| e.action), Some(JournalAction::Create));
        assert_eq!(after.last(), before.last());
    }

    #[test]
    fn pack_requires_writable_handle() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        let mut db = open_read_only(temp.path());
        assert!(matches!(db.pack(&Date::now()), Err(HyperdbError::Database(_))));
    }
}

// =============================================================================
// LINKS
// =============================================================================

mod links {
    use super::*;

    #[test]
    fn out_of_range_link_is_index_error() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        let mut issue = db.getclass("issue").expect("issue");
        assert!(matches!(
            issue.create([("status", Value::link("999"))]),
            Err(HyperdbError::Index(_))
        ));
        issue.create([("title", Value::from("spam"))]).expect("create");
        assert!(matches!(
            issue.set("1", [("status", Value::link("999"))]),
            Err(HyperdbError::Index(_))
        ));
    }

    #[test]
    fn unresolvable_key_is_value_error() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        let mut issue = db.getclass("issue").expect("issue");
        assert!(matches!(
            issue.create([("status", Value::link("bogus"))]),
            Err(HyperdbError::Value(_))
        ));
    }

    #[test]
    fn key_values_resolve_to_ids() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        db.getclass("issue")
            .expect("issue")
            .create([
                ("status", Value::link("resolved")),
                ("nosy", Value::multilink(["bob", "1", "bob"])),
            ])
            .expect("create");
        assert_eq!(get(&mut db, "issue", "1", "status"), Some(Value::link("2")));
        assert_eq!(
            get(&mut db, "issue", "1", "nosy"),
            Some(Value::multilink(["1", "2"]))
        );
    }

    #[test]
    fn wrong_shape_is_type_error() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        let mut issue = db.getclass("issue").expect("issue");
        assert!(matches!(
            issue.create([("title", Value::from(1))]),
            Err(HyperdbError::Type(_))
        ));
        assert!(matches!(
            issue.create([("nosy", Value::link("1"))]),
            Err(HyperdbError::Type(_))
        ));
        assert_eq!(issue.count().expect("count"), 0);
    }

    #[test]
    fn find_returns_referencing_nodes() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        let mut issue = db.getclass("issue").expect("issue");
        issue.create([("nosy", Value::multilink(["1"]))]).expect("create");
        issue.create([("nosy", Value::multilink(["2"]))]).expect("create");
        issue.create([("assignedto", Value::link("2"))]).expect("create");
        assert_eq!(issue.find("nosy", &["2"]).expect("find"), vec!["2"]);
        assert_eq!(issue.find("assignedto", &["2", "1"]).expect("find"), vec!["3"]);
        assert!(matches!(issue.find("title", &["1"]), Err(HyperdbError::Type(_))));
    }
}

// =============================================================================
// KEYS
// =============================================================================

mod keys {
    use super::*;

    #[test]
    fn duplicate_key_is_value_error() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        let mut status = db.getclass("status").expect("status");
        status.create([("name", Value::from("unread"))]).expect("create");
        assert!(matches!(
            status.create([("name", Value::from("unread"))]),
            Err(HyperdbError::Value(_))
        ));
        status.create([("name", Value::from("read"))]).expect("create");
        assert!(matches!(
            status.set("2", [("name", Value::from("unread"))]),
            Err(HyperdbError::Value(_))
        ));
    }

    #[test]
    fn retired_key_can_be_reused_but_blocks_restore() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        let mut status = db.getclass("status").expect("status");
        status.create([("name", Value::from("unread"))]).expect("create");
        status.retire("1").expect("retire");
        status.create([("name", Value::from("unread"))]).expect("reuse");
        assert!(matches!(status.restore("1"), Err(HyperdbError::Value(_))));
        assert_eq!(status.lookup("unread").expect("lookup"), "2");
    }

    #[test]
    fn lookup_errors() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        assert_eq!(
            db.getclass("user").expect("user").lookup("bob").expect("lookup"),
            "2"
        );
        assert!(matches!(
            db.getclass("user").expect("user").lookup("carol"),
            Err(HyperdbError::Value(_))
        ));
        assert!(matches!(
            db.getclass("issue").expect("issue").lookup("spam"),
            Err(HyperdbError::Key(_))
        ));
    }

    #[test]
    fn setkey_checks_property() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        let mut issue = db.getclass("issue").expect("issue");
        assert!(matches!(issue.setkey("bogus"), Err(HyperdbError::Key(_))));
        assert!(matches!(issue.setkey("priority"), Err(HyperdbError::Type(_))));
        issue.setkey("title").expect("setkey");
        assert_eq!(issue.getkey().expect("getkey").as_deref(), Some("title"));
        assert_eq!(issue.labelprop(false).expect("labelprop"), "title");
    }
}

// =============================================================================
// RETIRE
// =============================================================================

mod retire {
    use super::*;

    #[test]
    fn retired_nodes_leave_list_but_stay_readable() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        let mut status = db.getclass("status").expect("status");
        status.retire("1").expect("retire");
        assert_eq!(status.list().expect("list"), vec!["2"]);
        assert_eq!(status.getnodeids().expect("ids"), vec!["1", "2"]);
        assert_eq!(status.count().expect("count"), 2);
        assert!(status.is_retired("1").expect("is_retired"));
        assert_eq!(
            status.get("1", "name").expect("get"),
            Some(Value::from("unread"))
        );
        assert!(matches!(
            status.set("1", [("name", Value::from("x"))]),
            Err(HyperdbError::Index(_))
        ));
    }
}

// =============================================================================
// ERRORS
// =============================================================================

mod errors {
    use super::*;

    #[test]
    fn unknown_property_checked_before_node() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        let mut issue = db.getclass("issue").expect("issue");
        assert!(matches!(issue.get("99", "bogus"), Err(HyperdbError::Key(_))));
        assert!(matches!(issue.get("99", "title"), Err(HyperdbError::Index(_))));
    }

    #[test]
    fn protected_properties_cannot_be_supplied() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        let mut issue = db.getclass("issue").expect("issue");
        assert!(matches!(
            issue.create([("creation", Value::from(Date::now()))]),
            Err(HyperdbError::Key(_))
        ));
        assert!(matches!(
            issue.create([("bogus", Value::from("x"))]),
            Err(HyperdbError::Key(_))
        ));
    }

    #[test]
    fn unknown_class_is_key_error() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        assert!(matches!(db.getclass("msg"), Err(HyperdbError::Key(_))));
        assert!(matches!(db.getjournal("msg", "1"), Err(HyperdbError::Key(_))));
    }

    #[test]
    fn non_finite_numbers_rejected() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        let mut issue = db.getclass("issue").expect("issue");
        assert!(matches!(
            issue.create([("priority", Value::Number(f64::NAN))]),
            Err(HyperdbError::Value(_))
        ));
        let id = issue
            .create([("priority", Value::Number(1.0))])
            .expect("create");
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                issue.set(&id, [("priority", Value::Number(bad))]),
                Err(HyperdbError::Value(_))
            ));
        }
        assert_eq!(issue.get(&id, "priority").expect("get"), Some(Value::Number(1.0)));
        assert_eq!(issue.history(&id).expect("history").len(), 1);
        assert_eq!(issue.list().expect("list"), vec![id]);
    }
}

// =============================================================================
// SCHEMA MIGRATION
// =============================================================================

mod schema_migration {
    use super::*;

    #[test]
    fn addprop_reads_default_on_old_nodes() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        let mut status = db.getclass("status").expect("status");
        status
            .addprop([
                ("description", PropertyType::String),
                ("watchers", PropertyType::multilink("user")),
            ])
            .expect("addprop");
        assert_eq!(status.get("1", "description").expect("get"), None);
        assert_eq!(
            status.get("1", "watchers").expect("get"),
            Some(Value::Multilink(vec![]))
        );
        assert!(matches!(
            status.addprop([("name", PropertyType::String)]),
            Err(HyperdbError::Value(_))
        ));
        assert!(matches!(
            status.addprop([("actor", PropertyType::String)]),
            Err(HyperdbError::Value(_))
        ));
    }

    #[test]
    fn getprops_and_labelprop() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        let issue = db.getclass("issue").expect("issue");
        let plain = issue.getprops(false).expect("props");
        assert!(plain.contains_key("title"));
        assert!(!plain.contains_key("creation"));
        let all = issue.getprops(true).expect("props");
        assert_eq!(all.get("creation"), Some(&PropertyType::Date));
        assert_eq!(all.get("id"), Some(&PropertyType::String));
        assert_eq!(issue.labelprop(false).expect("labelprop"), "title");

        let file = db.getclass("file").expect("file");
        assert!(file.getprops(false).expect("props").contains_key("content"));
        assert_eq!(file.labelprop(true).expect("labelprop"), "name");
    }

    #[test]
    fn parse_value_resolves_text() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        let mut issue = db.getclass("issue").expect("issue");
        assert_eq!(
            issue.parse_value("status", "resolved").expect("parse"),
            Some(Value::link("2"))
        );
        assert_eq!(
            issue.parse_value("nosy", "bob, alice").expect("parse"),
            Some(Value::multilink(["1", "2"]))
        );
        assert_eq!(
            issue.parse_value("urgent", "yes").expect("parse"),
            Some(Value::Boolean(true))
        );
        assert_eq!(
            issue.parse_value("priority", "").expect("parse"),
            None
        );
        assert!(matches!(
            issue.parse_value("priority", "high"),
            Err(HyperdbError::Value(_))
        ));
    }
}

// =============================================================================
// FILTER
// =============================================================================

mod filter {
    use super::*;

    fn spec(pairs: &[(&str, &str)]) -> FilterSpec {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.split(',').map(str::to_string).collect()))
            .collect()
    }

    fn populate(db: &mut Database) {
        seed(db);
        let mut issue = db.getclass("issue").expect("issue");
        issue
            .create([
                ("title", Value::from("spam")),
                ("status", Value::link("2")),
                ("nosy", Value::multilink(["1"])),
                ("deadline", Value::Date(Date::parse("2003-02-16").expect("date"))),
                ("priority", Value::from(2)),
            ])
            .expect("create");
        issue
            .create([
                ("title", Value::from("eggs")),
                ("status", Value::link("1")),
                ("nosy", Value::multilink(["1", "2"])),
                ("deadline", Value::Date(Date::parse("2003-03-08").expect("date"))),
                ("priority", Value::from(1)),
            ])
            .expect("create");
        issue
            .create([("title", Value::from("ham")), ("priority", Value::from(2))])
            .expect("create");
    }

    #[test]
    fn scalar_and_link_constraints() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        populate(&mut db);
        let mut issue = db.getclass("issue").expect("issue");
        let none: &[SortKey] = &[];
        assert_eq!(issue.filter(&spec(&[("title", "eggs")]), none, none).expect("filter"), vec!["2"]);
        assert_eq!(
            issue.filter(&spec(&[("status", "unread,-1")]), none, none).expect("filter"),
            vec!["2", "3"]
        );
        assert_eq!(issue.filter(&spec(&[("nosy", "2")]), none, none).expect("filter"), vec!["2"]);
        assert_eq!(
            issue.filter(&spec(&[("priority", "2"), ("nosy", "1")]), none, none).expect("filter"),
            vec!["1"]
        );
        assert!(matches!(
            issue.filter(&spec(&[("status", "bogus")]), none, none),
            Err(HyperdbError::Value(_))
        ));
        assert!(matches!(
            issue.filter(&spec(&[("bogus", "x")]), none, none),
            Err(HyperdbError::Key(_))
        ));
    }

    #[test]
    fn date_ranges() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        populate(&mut db);
        let mut issue = db.getclass("issue").expect("issue");
        let none: &[SortKey] = &[];
        assert_eq!(issue.filter(&spec(&[("deadline", "2003-02")]), none, none).expect("filter"), vec!["1"]);
        assert_eq!(
            issue.filter(&spec(&[("deadline", "2003-02-20;")]), none, none).expect("filter"),
            vec!["2"]
        );
        assert_eq!(
            issue.filter(&spec(&[("deadline", ";2003-03-08")]), none, none).expect("filter"),
            vec!["1", "2"]
        );
    }

    #[test]
    fn sort_and_group() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        populate(&mut db);
        let retire_none = FilterSpec::new();
        let mut issue = db.getclass("issue").expect("issue");
        assert_eq!(
            issue.filter(&retire_none, &[SortKey::parse("title")], &[]).expect("filter"),
            vec!["2", "3", "1"]
        );
        assert_eq!(
            issue.filter(&retire_none, &[SortKey::parse("-title")], &[]).expect("filter"),
            vec!["1", "3", "2"]
        );
        // priority 1 before 2; within priority 2 ids ascend.
        assert_eq!(
            issue.filter(&retire_none, &[], &[SortKey::parse("priority")]).expect("filter"),
            vec!["2", "1", "3"]
        );
        // Links sort by label: null, "resolved", "unread".
        assert_eq!(
            issue.filter(&retire_none, &[SortKey::descending("id")], &[SortKey::parse("status")]).expect("filter"),
            vec!["3", "1", "2"]
        );
    }

    #[test]
    fn retired_nodes_are_excluded() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        populate(&mut db);
        let mut issue = db.getclass("issue").expect("issue");
        issue.retire("1").expect("retire");
        assert_eq!(
            issue.filter(&spec(&[("priority", "2")]), &[], &[]).expect("filter"),
            vec!["3"]
        );
    }
}

// =============================================================================
// ENGINES
// =============================================================================

mod engines {
    use super::*;
    use std::fs;

    #[test]
    fn flat_engine_round_trip() {
        let temp = tempdir().expect("temp dir");
        {
            let mut db = open_with(temp.path(), Some(EngineKind::Flat));
            seed(&mut db);
        }
        assert!(temp.path().join("nodes.status.hdb").is_file());
        // Existing stores are detected from their header, not preference.
        let mut db = open_with(temp.path(), Some(EngineKind::Redb));
        assert_eq!(db.getclass("status").expect("status").lookup("resolved").expect("lookup"), "2");
    }

    #[test]
    fn unknown_header_is_database_error() {
        let temp = tempdir().expect("temp dir");
        fs::write(temp.path().join("nodes.status"), b"garbage").expect("write");
        let mut db = open(temp.path());
        assert!(matches!(
            db.getclass("status").expect("status").list(),
            Err(HyperdbError::Database(_))
        ));
    }

    #[test]
    fn two_engine_files_are_ambiguous() {
        let temp = tempdir().expect("temp dir");
        {
            let mut db = open_with(temp.path(), Some(EngineKind::Flat));
            seed(&mut db);
        }
        fs::copy(
            temp.path().join("nodes.status.hdb"),
            temp.path().join("nodes.status"),
        )
        .expect("copy");
        let mut db = open(temp.path());
        assert!(matches!(
            db.getclass("status").expect("status").list(),
            Err(HyperdbError::Value(_))
        ));
    }

    #[test]
    fn clear_removes_everything() {
        let temp = tempdir().expect("temp dir");
        let mut db = open(temp.path());
        seed(&mut db);
        db.clear().expect("clear");
        assert_eq!(db.getclass("status").expect("status").count().expect("count"), 0);
        let id = db
            .getclass("status")
            .expect("status")
            .create([("name", Value::from("fresh"))])
            .expect("create");
        assert_eq!(id, "1");
    }
}
