//! Invocation dispatch
//!
//! Every projection call lands in [`invoke`]. The bound operation's kind,
//! computed once at contract registration, picks the branch: reads go
//! through the evaluator and the materializer, mutations through the duplex
//! analyzer. Observers are told about mutations after all tree guards have
//! been released.

use tracing::{debug, trace};
use xbind_path::{analyze, evaluate_with_namespaces, resolve_existing, CompiledPath, NamespaceContext, WritePath, WriteStep, WriteTarget};
use xbind_tree::{Document, Fragment, NodeId, NodeKind, NodeRef};

use crate::auto::{AutoList, AutoMap, AutoValue};
use crate::classify::{BoundOperation, OperationKind};
use crate::contract::ReturnType;
use crate::convert::ConverterRegistry;
use crate::document::{DocumentRef, SharedDocument};
use crate::error::{ProjectionError, Result};
use crate::materialize::{fragment_text, prepare_payload, render_argument, Item, Materializer, Payload};
use crate::projection::Projection;
use crate::projector::Projector;
use crate::value::Value;

/// Run `operation` on `projection`
pub(crate) fn invoke(projection: &Projection, operation: &str, args: &[Value]) -> Result<Value> {
    let projector = projection.projector();
    let contract = projection.contract();
    let bound = contract.operation(operation);

    if let Some(capability) = contract.capability_of(operation) {
        if let Some(mixin) = projector.get_mixin(&contract.name, capability) {
            trace!(contract = %contract.name, operation, capability, "delegating to mixin");
            return mixin.invoke(projection, operation, args);
        }
        if bound.is_none() {
            return Err(ProjectionError::MissingCapability {
                contract: contract.name.clone(),
                capability: capability.to_string(),
                operation: operation.to_string(),
            });
        }
    }

    let op = bound.ok_or_else(|| ProjectionError::UnknownOperation {
        contract: contract.name.clone(),
        operation: operation.to_string(),
    })?;
    if args.len() != op.params.len() {
        return Err(ProjectionError::InvalidArguments {
            operation: operation.to_string(),
            expected: op.params.len(),
            actual: args.len(),
        });
    }

    let _calls = projector
        .flags()
        .synchronize_on_documents
        .then(|| projection.document().lock_calls());

    let template = projector
        .externalizer()
        .resolve_path(&contract.name, op, &op.path, args)?;
    let path = substitute(&template, op, args, &projector.converters())?;
    debug!(
        contract = %contract.name,
        operation,
        kind = %op.kind,
        path = %path,
        "dispatching projection call"
    );

    let (result, changed) = match op.kind {
        OperationKind::Read => {
            let value = read(projector, projection.document(), projection.node_id(), &path, op)?;
            (value, 0)
        }
        OperationKind::ExternalRead => (external_read(projector, &contract.name, &path, op, args)?, 0),
        OperationKind::Write => {
            let count = write(projection, &path, op, args)?;
            (mutation_result(projection, op, count), count)
        }
        OperationKind::Update => {
            let count = update(projection, &path, op, args)?;
            (mutation_result(projection, op, count), count)
        }
        OperationKind::Delete => {
            let count = delete(projection, &path)?;
            (mutation_result(projection, op, count), count)
        }
        OperationKind::AutoBind => (auto_view(projection, path, op)?, 0),
    };

    if changed > 0 {
        projector.notify_changed(projection.document());
    }
    Ok(result)
}

/// Replace every `{i}` in `template` with the rendered argument `i`
pub(crate) fn substitute(
    template: &str,
    op: &BoundOperation,
    args: &[Value],
    converters: &ConverterRegistry,
) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 || !after[digits..].starts_with('}') {
            out.push('{');
            rest = after;
            continue;
        }
        let index: usize = after[..digits].parse().map_err(|_| {
            ProjectionError::PathSyntax(format!("placeholder out of range in '{}'", template))
        })?;
        let (arg, param) = match (args.get(index), op.params.get(index)) {
            (Some(arg), Some(param)) => (arg, param),
            _ => {
                return Err(ProjectionError::PathSyntax(format!(
                    "placeholder {{{}}} in '{}' has no argument",
                    index, template
                )))
            }
        };
        out.push_str(&render_argument(converters, arg, &param.ty)?);
        rest = &after[digits + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn read(
    projector: &Projector,
    document: &DocumentRef,
    context: NodeId,
    path: &str,
    op: &BoundOperation,
) -> Result<Value> {
    let compiled = CompiledPath::compile(path)?;
    let tree = document.read();
    let namespaces = projector.namespaces(&tree);
    let result = evaluate_with_namespaces(&compiled, &tree, &NodeRef::Node(context), &namespaces)?;
    let converters = projector.converters();
    Materializer {
        projector,
        document,
        tree: &tree,
        converters: &converters,
    }
    .read(result, op)
}

fn external_read(
    projector: &Projector,
    contract: &str,
    path: &str,
    op: &BoundOperation,
    args: &[Value],
) -> Result<Value> {
    let declared = op.source.as_deref().unwrap_or_default();
    let template = projector.externalizer().resolve_url(contract, op, declared, args)?;
    let url = substitute(&template, op, args, &projector.converters())?;
    let source = projector.document_source().ok_or_else(|| {
        ProjectionError::ExternalSource(format!("no document source to load '{}'", url))
    })?;
    debug!(operation = %op.name, url = %url, "loading external document");
    let document = SharedDocument::new(source.load(&url)?);
    let context = document.read().document_node();
    read(projector, &document, context, path, op)
}

fn value_payload(projector: &Projector, op: &BoundOperation, args: &[Value]) -> Result<Payload> {
    let index = op.value_param.unwrap_or(0);
    match (args.get(index), op.params.get(index)) {
        (Some(value), Some(param)) => prepare_payload(&projector.converters(), value, &param.ty),
        _ => Err(ProjectionError::InvalidArguments {
            operation: op.name.clone(),
            expected: index + 1,
            actual: args.len(),
        }),
    }
}

fn write(projection: &Projection, path: &str, op: &BoundOperation, args: &[Value]) -> Result<usize> {
    let projector = projection.projector();
    // Captured before the write guard: the payload may come from this document
    let payload = value_payload(projector, op, args)?;
    let write_path = analyze(&CompiledPath::compile(path)?)?;
    let mut tree = projection.document().write();
    let namespaces = projector.namespaces(&tree);
    write_payload(&mut tree, &write_path, projection.node_id(), &payload, &namespaces)
}

fn update(projection: &Projection, path: &str, op: &BoundOperation, args: &[Value]) -> Result<usize> {
    let projector = projection.projector();
    let payload = value_payload(projector, op, args)?;
    let compiled = CompiledPath::compile(path)?;
    let mut tree = projection.document().write();
    let namespaces = projector.namespaces(&tree);
    let targets = resolve_existing(&compiled, &tree, &NodeRef::Node(projection.node_id()), &namespaces)?;
    for target in &targets {
        match &payload {
            Payload::Remove => apply_text(&mut tree, target, "")?,
            Payload::Text(text) => apply_text(&mut tree, target, text)?,
            Payload::Fragment(fragment) => apply_fragment(&mut tree, target, fragment)?,
            Payload::Items(_) => {
                return Err(ProjectionError::conversion(format!(
                    "'{}' updates existing nodes and cannot take a list",
                    op.name
                )))
            }
        }
    }
    Ok(targets.len())
}

fn delete(projection: &Projection, path: &str) -> Result<usize> {
    let projector = projection.projector();
    let compiled = CompiledPath::compile(path)?;
    let mut tree = projection.document().write();
    let namespaces = projector.namespaces(&tree);
    let targets = resolve_existing(&compiled, &tree, &NodeRef::Node(projection.node_id()), &namespaces)?;
    let mut removed = 0;
    for target in &targets {
        if remove_target(&mut tree, target)? {
            removed += 1;
        }
    }
    Ok(removed)
}

fn auto_view(projection: &Projection, path: String, op: &BoundOperation) -> Result<Value> {
    CompiledPath::compile(&path)?;
    let projector = projection.projector().clone();
    let document = projection.document().clone();
    let context = projection.node_id();
    match &op.returns {
        Some(ReturnType::AutoValue(ty)) => Ok(Value::AutoValue(AutoValue::new(
            projector,
            document,
            context,
            path,
            ty.clone(),
        ))),
        Some(ReturnType::AutoList(ty)) => Ok(Value::AutoList(AutoList::new(
            projector,
            document,
            context,
            path,
            ty.clone(),
        ))),
        Some(ReturnType::AutoMap(ty)) => Ok(Value::AutoMap(AutoMap::new(
            projector,
            document,
            context,
            path,
            ty.clone(),
        ))),
        other => Err(ProjectionError::conversion(format!(
            "'{}' cannot produce a live view of {:?}",
            op.name, other
        ))),
    }
}

fn mutation_result(projection: &Projection, op: &BoundOperation, count: usize) -> Value {
    match &op.returns {
        Some(ReturnType::This) => Value::Projection(projection.clone()),
        Some(ReturnType::Value(ty)) if ty.is_integer() => Value::Int(count as i64),
        _ => Value::Null,
    }
}

// ── Tree mutation ────────────────────────────────────────────────────────

/// Apply `payload` to the destination of `path`; returns the number of
/// nodes written or removed
pub(crate) fn write_payload(
    tree: &mut Document,
    path: &WritePath,
    context: NodeId,
    payload: &Payload,
    namespaces: &NamespaceContext,
) -> Result<usize> {
    match payload {
        Payload::Remove => match path.resolve(tree, context, false, namespaces)? {
            Some(target) => Ok(usize::from(remove_target(tree, &NodeRef::from(target))?)),
            None => Ok(0),
        },
        Payload::Text(text) => {
            let target = create_target(tree, path, context, namespaces)?;
            apply_text(tree, &target, text)?;
            Ok(1)
        }
        Payload::Fragment(fragment) => {
            let target = create_target(tree, path, context, namespaces)?;
            apply_fragment(tree, &target, fragment)?;
            Ok(1)
        }
        Payload::Items(items) => write_items(tree, path, context, items, namespaces),
    }
}

fn create_target(
    tree: &mut Document,
    path: &WritePath,
    context: NodeId,
    namespaces: &NamespaceContext,
) -> Result<NodeRef> {
    path.resolve(tree, context, true, namespaces)?
        .map(NodeRef::from)
        .ok_or_else(|| ProjectionError::NonWritablePath(format!("'{}' has no destination", path.source())))
}

/// Replace the children matching the last step with one element per item
fn write_items(
    tree: &mut Document,
    path: &WritePath,
    context: NodeId,
    items: &[Item],
    namespaces: &NamespaceContext,
) -> Result<usize> {
    let (parent_path, last) = match path.split_last() {
        Some((parent_path, last)) if matches!(last, WriteStep::Element { .. }) => (parent_path, last),
        _ => {
            return Err(ProjectionError::NonWritablePath(format!(
                "'{}' must end in an element step to hold a list",
                path.source()
            )))
        }
    };
    let parent = match parent_path.resolve(tree, context, true, namespaces)? {
        Some(WriteTarget::Element(parent)) => parent,
        _ => {
            return Err(ProjectionError::NonWritablePath(format!(
                "'{}' has no parent element for list items",
                path.source()
            )))
        }
    };

    tree.remove_children_where(parent, |doc, child| last.matches(doc, child, namespaces))?;
    for item in items {
        let element = parent_path.create(last, tree, parent, namespaces)?;
        match item {
            Item::Text(text) => tree.set_text_content(element, text)?,
            Item::Fragment(fragment) => tree.replace_content(element, fragment)?,
        }
    }
    Ok(items.len())
}

/// Overwrite the text of an element, text node or attribute
pub(crate) fn apply_text(tree: &mut Document, target: &NodeRef, text: &str) -> Result<()> {
    match target {
        NodeRef::Attribute { owner, name } => tree.set_attribute(*owner, name.as_str(), text)?,
        NodeRef::Node(id) => match tree.kind(*id) {
            Some(NodeKind::Element) => tree.set_text_content(*id, text)?,
            Some(NodeKind::Text | NodeKind::Comment) => tree.set_text(*id, text)?,
            _ => {
                return Err(ProjectionError::NonWritablePath(format!(
                    "node {} cannot hold text",
                    id
                )))
            }
        },
    }
    Ok(())
}

/// Overwrite a destination with a copied subtree
fn apply_fragment(tree: &mut Document, target: &NodeRef, fragment: &Fragment) -> Result<()> {
    match target {
        NodeRef::Node(id) if tree.is_element(*id) => tree.replace_content(*id, fragment)?,
        NodeRef::Node(id) if *id == tree.document_node() => {
            let element = tree.build(fragment)?;
            tree.set_document_element(Some(element))?;
        }
        other => apply_text(tree, other, &fragment_text(fragment))?,
    }
    Ok(())
}

/// Remove a node's subtree or drop an attribute; false when there was
/// nothing to remove
pub(crate) fn remove_target(tree: &mut Document, target: &NodeRef) -> Result<bool> {
    match target {
        NodeRef::Attribute { owner, name } => Ok(tree.remove_attribute(*owner, name)?.is_some()),
        NodeRef::Node(id) => {
            if tree.parent(*id).is_none() {
                return Ok(false);
            }
            tree.remove(*id)?;
            Ok(true)
        }
    }
}
