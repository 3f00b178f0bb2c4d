#![allow(clippy::unwrap_used)]
//! Integration tests for xbind projections
//!
//! These tests drive whole contracts through a projector:
//! - Reads, writes, updates and deletes against shared documents
//! - Absent-value policies and declared errors
//! - Sub-projections, lists and live views
//! - Namespaces, external sources, configuration and observers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use xbind::{
    ChangeObserver, Contract, Document, ElementType, InMemorySource, OperationDecl, ParamType,
    ProjectionError, Projector, ProjectorConfig, QName, ReturnType, TableExternalizer, Value,
    ValueType,
};

// ============================================================================
// Contracts
// ============================================================================

fn book() -> Contract {
    Contract::new("Book")
        .operation(OperationDecl::new("title").read("title").returns(ReturnType::string()))
        .operation(OperationDecl::new("id").read("@id").returns(ReturnType::string()))
        .operation(OperationDecl::new("set_title").write("title").param(ParamType::string()))
        .operation(OperationDecl::new("set_id").write("@id").param(ParamType::string()))
}

fn library() -> Contract {
    Contract::new("Library")
        .operation(
            OperationDecl::new("books")
                .read("/library/book")
                .returns(ReturnType::projections("Book")),
        )
        .operation(
            OperationDecl::new("titles")
                .read("/library/book/title")
                .returns(ReturnType::list_of(ValueType::String)),
        )
        .operation(
            OperationDecl::new("book_by_id")
                .read("/library/book[@id='{0}']")
                .param(ParamType::string())
                .returns(ReturnType::Optional(ElementType::Projection("Book".into()))),
        )
        .operation(
            OperationDecl::new("add_book")
                .write("/library/book[@id='{0}']/title")
                .param(ParamType::string())
                .value_param(ParamType::string()),
        )
        .operation(
            OperationDecl::new("set_books")
                .write("/library/book")
                .param(ParamType::List(ElementType::Projection("Book".into()))),
        )
        .operation(
            OperationDecl::new("rename_all")
                .update("/library/book/title")
                .param(ParamType::string())
                .returns(ReturnType::int()),
        )
        .operation(
            OperationDecl::new("remove_book")
                .delete("/library/book[@id='{0}']")
                .param(ParamType::string())
                .returns(ReturnType::int()),
        )
        .operation(
            OperationDecl::new("owner")
                .read("/library/@owner")
                .returns(ReturnType::string())
                .throws("MissingOwner"),
        )
        .operation(
            OperationDecl::new("set_owner")
                .write("/library/@owner")
                .param(ParamType::string())
                .returns(ReturnType::This),
        )
        .operation(
            OperationDecl::new("count")
                .read("count(/library/book)")
                .returns(ReturnType::int()),
        )
        .operation(
            OperationDecl::new("owner_view")
                .auto("/library/@owner")
                .returns(ReturnType::AutoValue(ValueType::String)),
        )
}

fn projector_with(builder: xbind::ProjectorBuilder) -> Projector {
    let projector = builder.build().unwrap();
    projector.register_contract(&book()).unwrap();
    projector.register_contract(&library()).unwrap();
    projector
}

fn projector() -> Projector {
    projector_with(Projector::builder())
}

fn add_book(library: &xbind::Projection, id: &str, title: &str) {
    library
        .invoke("add_book", &[Value::from(id), Value::from(title)])
        .unwrap();
}

// ============================================================================
// Writes
// ============================================================================

#[test]
fn test_write_creates_missing_path_with_predicate() {
    let projector = projector();
    let library = projector.project_empty_document("Library").unwrap();
    add_book(&library, "5", "Dune");
    assert_eq!(
        library.to_xml(),
        "<library><book id=\"5\"><title>Dune</title></book></library>"
    );
}

#[test]
fn test_write_then_read_round_trips() {
    let projector = projector();
    let library = projector.project_empty_document("Library").unwrap();
    library.set("set_owner", "Ada").unwrap();
    assert_eq!(library.get("owner").unwrap(), Value::from("Ada"));
    library.set("set_owner", "Grace").unwrap();
    assert_eq!(library.get("owner").unwrap(), Value::from("Grace"));
}

#[test]
fn test_positional_write_target_is_rejected() {
    let projector = Projector::new();
    projector
        .register_contract(
            &Contract::new("Bad").operation(
                OperationDecl::new("set_first")
                    .write("/a/b[1]")
                    .param(ParamType::string()),
            ),
        )
        .unwrap();
    let bad = projector.project_empty_document("Bad").unwrap();
    let err = bad.set("set_first", "x").unwrap_err();
    assert!(matches!(err, ProjectionError::NonWritablePath(_)), "{:?}", err);
    assert!(bad.document().read().document_element().is_none());
}

#[test]
fn test_write_null_removes_destination() {
    let projector = projector();
    let library = projector.project_empty_document("Library").unwrap();
    library.set("set_owner", "Ada").unwrap();
    library.invoke("set_owner", &[Value::Null]).unwrap();
    let err = library.get("owner").unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_fluent_setter() {
    let projector = projector();
    let library = projector.project_empty_document("Library").unwrap();
    let same = library.set("set_owner", "Ada").unwrap().into_projection().unwrap();
    assert_eq!(same.node_id(), library.node_id());
}

#[test]
fn test_list_write_replaces_items() {
    let projector = projector();
    let library = projector.project_empty_document("Library").unwrap();
    add_book(&library, "old", "Old");

    let first = projector.project_empty_element("book", "Book").unwrap();
    first.set("set_id", "a").unwrap();
    first.set("set_title", "A").unwrap();
    let second = projector.project_empty_element("book", "Book").unwrap();
    second.set("set_id", "b").unwrap();
    second.set("set_title", "B").unwrap();

    library
        .set("set_books", Value::List(vec![first.into(), second.into()]))
        .unwrap();
    assert_eq!(
        library.get("titles").unwrap(),
        Value::from(vec!["A", "B"])
    );
    assert_eq!(library.get("count").unwrap(), Value::Int(2));
    assert_eq!(
        library.to_xml(),
        "<library><book id=\"a\"><title>A</title></book><book id=\"b\"><title>B</title></book></library>"
    );
}

#[test]
fn test_repeated_writes_reuse_arena_slots() {
    let projector = projector();
    let library = projector.project_empty_document("Library").unwrap();
    add_book(&library, "1", "first");
    let capacity = library.document().read().capacity();
    for i in 0..10_000 {
        add_book(&library, "1", &i.to_string());
        library.set("rename_all", "x").unwrap();
    }
    assert_eq!(library.document().read().capacity(), capacity);

    let template = projector.project_empty_element("book", "Book").unwrap();
    template.set("set_title", "A").unwrap();
    for _ in 0..100 {
        library
            .set("set_books", Value::List(vec![template.clone().into()]))
            .unwrap();
    }
    assert!(library.document().read().capacity() <= capacity + 4);
    assert_eq!(library.get("titles").unwrap(), Value::from(vec!["A"]));
}

// ============================================================================
// Updates and deletes
// ============================================================================

#[test]
fn test_update_with_zero_matches_is_noop() {
    let projector = projector();
    let library = projector.project_empty_document("Library").unwrap();
    library.set("set_owner", "Ada").unwrap();
    let before = library.document().snapshot();
    assert_eq!(library.set("rename_all", "x").unwrap(), Value::Int(0));
    assert_eq!(library.document().snapshot(), before);
}

#[test]
fn test_update_changes_every_match() {
    let projector = projector();
    let library = projector.project_empty_document("Library").unwrap();
    add_book(&library, "1", "Dune");
    add_book(&library, "2", "Emma");
    assert_eq!(library.set("rename_all", "Untitled").unwrap(), Value::Int(2));
    assert_eq!(
        library.get("titles").unwrap(),
        Value::from(vec!["Untitled", "Untitled"])
    );
}

#[test]
fn test_delete_is_idempotent() {
    let projector = projector();
    let library = projector.project_empty_document("Library").unwrap();
    add_book(&library, "1", "Dune");
    add_book(&library, "2", "Emma");

    assert_eq!(library.set("remove_book", "1").unwrap(), Value::Int(1));
    let after_first = library.document().snapshot();
    assert_eq!(library.set("remove_book", "1").unwrap(), Value::Int(0));
    assert_eq!(library.document().snapshot(), after_first);
    assert_eq!(library.get("titles").unwrap(), Value::from(vec!["Emma"]));
}

// ============================================================================
// Reads
// ============================================================================

#[test]
fn test_absent_read_raises_declared_error() {
    let projector = projector();
    let library = projector.project_empty_document("Library").unwrap();
    let err = library.get("owner").unwrap_err();
    match err {
        ProjectionError::NotFound { operation, error } => {
            assert_eq!(operation, "owner");
            assert_eq!(error, "MissingOwner");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_absent_read_with_empty_flag() {
    let projector = projector_with(Projector::builder().absent_is_empty(true));
    let library = projector.project_empty_document("Library").unwrap();
    assert_eq!(library.get("owner").unwrap(), Value::from(""));
    assert_eq!(library.get("titles").unwrap(), Value::List(vec![]));
    assert_eq!(library.set("book_by_id", "1").unwrap(), Value::Null);
}

#[test]
fn test_sub_projections_resolve_against_their_node() {
    let projector = projector();
    let library = projector.project_empty_document("Library").unwrap();
    add_book(&library, "1", "Dune");
    add_book(&library, "2", "Emma");

    let books = library.get("books").unwrap().into_list().unwrap();
    assert_eq!(books.len(), 2);
    let second = books[1].as_projection().unwrap();
    assert_eq!(second.get("id").unwrap(), Value::from("2"));
    assert_eq!(second.get("title").unwrap(), Value::from("Emma"));

    second.set("set_title", "Persuasion").unwrap();
    assert_eq!(
        library.get("titles").unwrap(),
        Value::from(vec!["Dune", "Persuasion"])
    );

    let found = library.set("book_by_id", "1").unwrap().into_projection().unwrap();
    assert_eq!(found.get("title").unwrap(), Value::from("Dune"));
    assert_eq!(found, books[0].as_projection().unwrap().clone());
    assert_eq!(library.set("book_by_id", "9").unwrap(), Value::Null);
}

#[test]
fn test_collection_reads_preserve_document_order() {
    let projector = projector();
    let library = projector.project_empty_document("Library").unwrap();
    for (id, title) in [("3", "C"), ("1", "A"), ("2", "B")] {
        add_book(&library, id, title);
    }
    assert_eq!(
        library.get("titles").unwrap(),
        Value::from(vec!["C", "A", "B"])
    );
}

#[test]
fn test_omit_empty_nodes() {
    let contract = Contract::new("List").operation(
        OperationDecl::new("items")
            .read("/list/item")
            .returns(ReturnType::list_of(ValueType::String)),
    );
    let mut doc = Document::with_root("list");
    let root = doc.document_element().unwrap();
    for text in ["a", "", "c"] {
        let item = doc.create_element("item");
        doc.set_text_content(item, text).unwrap();
        doc.append_child(root, item).unwrap();
    }

    let plain = Projector::new();
    plain.register_contract(&contract).unwrap();
    let all = plain.project_document(doc.clone(), "List").unwrap();
    assert_eq!(all.get("items").unwrap(), Value::from(vec!["a", "", "c"]));

    let omitting = Projector::builder().omit_empty_nodes(true).build().unwrap();
    omitting.register_contract(&contract).unwrap();
    let some = omitting.project_document(doc, "List").unwrap();
    assert_eq!(some.get("items").unwrap(), Value::from(vec!["a", "c"]));
}

#[test]
fn test_malformed_text_is_a_conversion_error() {
    let projector = Projector::new();
    projector
        .register_contract(
            &Contract::new("Counter").operation(
                OperationDecl::new("value")
                    .read("/counter")
                    .returns(ReturnType::int()),
            ),
        )
        .unwrap();
    let mut doc = Document::with_root("counter");
    let root = doc.document_element().unwrap();
    doc.set_text_content(root, "twelve").unwrap();
    let counter = projector.project_document(doc, "Counter").unwrap();
    assert!(matches!(
        counter.get("value").unwrap_err(),
        ProjectionError::Conversion(_)
    ));
}

// ============================================================================
// Live views
// ============================================================================

#[test]
fn test_auto_value_sees_later_writes() {
    let projector = projector();
    let library = projector.project_empty_document("Library").unwrap();
    let Value::AutoValue(owner) = library.get("owner_view").unwrap() else {
        panic!("expected an auto value");
    };
    assert!(!owner.exists().unwrap());
    library.set("set_owner", "Ada").unwrap();
    assert_eq!(owner.get().unwrap(), Value::from("Ada"));
    owner.set("Grace").unwrap();
    assert_eq!(library.get("owner").unwrap(), Value::from("Grace"));
}

// ============================================================================
// Binding and classification
// ============================================================================

#[test]
fn test_invalid_declarations_fail_at_registration() {
    let projector = Projector::new();
    let both = Contract::new("Both").operation(
        OperationDecl::new("x")
            .read("/a")
            .write("/a")
            .returns(ReturnType::string())
            .param(ParamType::string()),
    );
    assert!(projector.register_contract(&both).unwrap_err().is_validation());

    let external_write = Contract::new("Ext").operation(
        OperationDecl::new("x")
            .write("/a")
            .external("mem://a")
            .param(ParamType::string()),
    );
    assert!(projector
        .register_contract(&external_write)
        .unwrap_err()
        .is_validation());
    assert!(projector.contract("Ext").is_err());
}

// ============================================================================
// Namespaces and external documents
// ============================================================================

#[test]
fn test_prefixed_names_match_by_namespace() {
    let mut doc = Document::new();
    let root = doc.create_element(QName::parse("p:root").with_namespace("urn:p"));
    doc.append_child(doc.document_node(), root).unwrap();
    doc.set_attribute(root, "xmlns:p", "urn:p").unwrap();
    let item = doc.create_element(QName::parse("p:item").with_namespace("urn:p"));
    doc.set_text_content(item, "v").unwrap();
    doc.append_child(root, item).unwrap();

    let projector = Projector::builder().namespace("q", "urn:p").build().unwrap();
    projector
        .register_contract(
            &Contract::new("Ns")
                .operation(OperationDecl::new("by_doc_prefix").read("/p:root/p:item").returns(ReturnType::string()))
                .operation(OperationDecl::new("by_config_prefix").read("/q:root/q:item").returns(ReturnType::string()))
                .operation(OperationDecl::new("unprefixed").read("/root/item").returns(ReturnType::string()))
                .operation(OperationDecl::new("set_extra").write("/p:root/p:extra").param(ParamType::string())),
        )
        .unwrap();
    let ns = projector.project_document(doc, "Ns").unwrap();
    assert_eq!(ns.get("by_doc_prefix").unwrap(), Value::from("v"));
    assert_eq!(ns.get("by_config_prefix").unwrap(), Value::from("v"));
    assert_eq!(ns.get("unprefixed").unwrap(), Value::Null);

    ns.set("set_extra", "e").unwrap();
    let tree = ns.document().read();
    let root = tree.document_element().unwrap();
    let extra = tree.element_children(root).last().unwrap();
    assert_eq!(tree.name(extra).unwrap().namespace.as_deref(), Some("urn:p"));
}

#[test]
fn test_external_read_loads_through_source() {
    let mut remote = Document::with_root("doc");
    let root = remote.document_element().unwrap();
    let title = remote.create_element("title");
    remote.set_text_content(title, "Remote").unwrap();
    remote.append_child(root, title).unwrap();

    let projector = Projector::new();
    projector
        .register_contract(
            &Contract::new("Remote").operation(
                OperationDecl::new("title")
                    .read("/doc/title")
                    .external("mem://{0}")
                    .param(ParamType::string())
                    .returns(ReturnType::string()),
            ),
        )
        .unwrap();
    let local = projector.project_empty_document("Remote").unwrap();

    let err = local.set("title", "one").unwrap_err();
    assert!(matches!(err, ProjectionError::ExternalSource(_)));

    projector.set_document_source(Arc::new(InMemorySource::new().with("mem://one", remote)));
    assert_eq!(local.set("title", "one").unwrap(), Value::from("Remote"));
    assert!(matches!(
        local.set("title", "two").unwrap_err(),
        ProjectionError::ExternalSource(_)
    ));
}

#[test]
fn test_externalized_templates() {
    let mut remote = Document::with_root("doc");
    let root = remote.document_element().unwrap();
    remote.set_attribute(root, "v", "far").unwrap();

    let projector = Projector::builder()
        .externalizer(Arc::new(
            TableExternalizer::new()
                .path("person.name", "/person/name[@lang='{0}']")
                .path("remote.value", "/doc/@v")
                .url("remote.home", "mem://{0}"),
        ))
        .document_source(Arc::new(InMemorySource::new().with("mem://home", remote)))
        .build()
        .unwrap();
    projector
        .register_contract(
            &Contract::new("Person")
                .operation(
                    OperationDecl::new("name")
                        .read("person.name")
                        .param(ParamType::string())
                        .returns(ReturnType::string()),
                )
                .operation(
                    OperationDecl::new("set_name")
                        .write("person.name")
                        .param(ParamType::string())
                        .value_param(ParamType::string()),
                )
                .operation(
                    OperationDecl::new("remote")
                        .read("remote.value")
                        .external("remote.home")
                        .param(ParamType::string())
                        .returns(ReturnType::string()),
                ),
        )
        .unwrap();

    let person = projector.project_empty_document("Person").unwrap();
    person
        .invoke("set_name", &[Value::from("en"), Value::from("Ada")])
        .unwrap();
    assert_eq!(
        person.to_xml(),
        "<person><name lang=\"en\">Ada</name></person>"
    );
    assert_eq!(person.set("name", "en").unwrap(), Value::from("Ada"));
    assert_eq!(person.set("remote", "home").unwrap(), Value::from("far"));
}

// ============================================================================
// Configuration and conversion
// ============================================================================

#[test]
fn test_config_drives_conversion() {
    let config = ProjectorConfig::parse_str(
        r#"
locale = "de-DE"
time_zone = "+02:00"

[flags]
absent_is_empty = true
"#,
    )
    .unwrap();
    let projector = Projector::from_config(config).unwrap();
    projector
        .register_contract(
            &Contract::new("Reading")
                .operation(OperationDecl::new("value").read("/r/@v").returns(ReturnType::Value(ValueType::F64)))
                .operation(OperationDecl::new("set_value").write("/r/@v").param(ParamType::Value(ValueType::F64)))
                .operation(OperationDecl::new("at").read("/r/@at").returns(ReturnType::Value(ValueType::date_time())))
                .operation(OperationDecl::new("set_at").write("/r/@at").param(ParamType::Value(ValueType::date_time()))),
        )
        .unwrap();
    let reading = projector.project_empty_document("Reading").unwrap();

    assert_eq!(reading.get("value").unwrap(), Value::Float(0.0));
    reading.set("set_value", 3.5).unwrap();
    assert_eq!(reading.to_xml(), "<r v=\"3,5\"/>");
    assert_eq!(reading.get("value").unwrap(), Value::Float(3.5));

    reading.set("set_at", "2024-05-01T10:00:00").unwrap();
    let Value::DateTime(at) = reading.get("at").unwrap() else {
        panic!("expected a date-time");
    };
    assert_eq!(at.to_rfc3339(), "2024-05-01T10:00:00+02:00");
}

// ============================================================================
// Observers and concurrency
// ============================================================================

#[derive(Default)]
struct Counter(AtomicUsize);

impl ChangeObserver for Counter {
    fn changed(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_observers_see_mutations_only() {
    let projector = projector();
    let counter = Arc::new(Counter::default());
    let observer: Arc<dyn ChangeObserver> = counter.clone();
    projector.add_change_observer(&observer);

    let library = projector.project_empty_document("Library").unwrap();
    add_book(&library, "1", "Dune");
    library.get("titles").unwrap();
    library.set("rename_all", "x").unwrap();
    library.set("remove_book", "9").unwrap();
    assert_eq!(counter.0.load(Ordering::SeqCst), 2);

    drop(observer);
    drop(counter);
    add_book(&library, "2", "Emma");
}

#[test]
fn test_document_observers_see_every_projector() {
    let first = projector();
    let second = projector();
    let library = first.project_empty_document("Library").unwrap();
    let shared = second
        .project_shared(library.document().clone(), "Library")
        .unwrap();

    let counter = Arc::new(Counter::default());
    let observer: Arc<dyn ChangeObserver> = counter.clone();
    library.document().add_change_observer(&observer);

    add_book(&library, "1", "Dune");
    add_book(&shared, "2", "Emma");
    shared.get("titles").unwrap();
    assert_eq!(counter.0.load(Ordering::SeqCst), 2);

    let before = library.structural_hash();
    shared.set("rename_all", "x").unwrap();
    assert_eq!(counter.0.load(Ordering::SeqCst), 3);
    assert_ne!(library.structural_hash(), before);
    assert_eq!(library.structural_hash(), shared.structural_hash());
}

#[test]
fn test_synchronized_writers_from_threads() {
    let projector = Projector::builder().synchronize_on_documents(true).build().unwrap();
    projector
        .register_contract(
            &Contract::new("Slots")
                .operation(
                    OperationDecl::new("set_slot")
                        .write("/root/slot[@n='{0}']")
                        .param(ParamType::int())
                        .value_param(ParamType::string()),
                )
                .operation(
                    OperationDecl::new("slots")
                        .read("/root/slot")
                        .returns(ReturnType::list_of(ValueType::String)),
                ),
        )
        .unwrap();
    let slots = projector.project_empty_document("Slots").unwrap();

    let handles: Vec<_> = (0..4i64)
        .map(|t| {
            let slots = slots.clone();
            thread::spawn(move || {
                for i in 0..10i64 {
                    slots
                        .invoke("set_slot", &[Value::Int(t * 10 + i), Value::from("x")])
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let values = slots.get("slots").unwrap().into_list().unwrap();
    assert_eq!(values.len(), 40);
}

// ============================================================================
// Structural equality
// ============================================================================

#[test]
fn test_tree_equality_is_structural() {
    let mut a = Document::with_root("r");
    let mut b = Document::with_root("r");
    let ra = a.document_element().unwrap();
    let rb = b.document_element().unwrap();
    a.set_attribute(ra, "x", "1").unwrap();
    a.set_attribute(ra, "y", "2").unwrap();
    b.set_attribute(rb, "y", "2").unwrap();
    b.set_attribute(rb, "x", "1").unwrap();
    assert_eq!(a, b);

    for (doc, root, names) in [(&mut a, ra, ["c1", "c2"]), (&mut b, rb, ["c2", "c1"])] {
        for name in names {
            let child = doc.create_element(name);
            doc.append_child(root, child).unwrap();
        }
    }
    assert_ne!(a, b);
}
