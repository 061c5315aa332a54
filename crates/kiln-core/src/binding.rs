//! Binding tables and run-time binding validation
//!
//! A binding is a non-owning reference from a named program parameter to a
//! resource id. Nothing is checked when binding; [`resolve`] validates the
//! whole table against the program right before a run.

use crate::error::{Error, Result};
use crate::resource::{ResourceId, Storage};
use kiln_backends::{CompiledProgram, ElementKind, Io, Parameter, Shape};
use std::collections::{BTreeMap, HashMap};

/// Resources bound to an executable, keyed by (parameter name, direction)
///
/// The same name may be bound once as input and once as output.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    entries: BTreeMap<(String, Io), ResourceId>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `resource`, returning the resource it replaced
    pub fn bind(&mut self, name: &str, io: Io, resource: ResourceId) -> Option<ResourceId> {
        self.entries.insert((name.to_string(), io), resource)
    }

    /// Remove a binding; unbinding an unbound key returns `None`
    pub fn unbind(&mut self, name: &str, io: Io) -> Option<ResourceId> {
        self.entries.remove(&(name.to_string(), io))
    }

    pub fn get(&self, name: &str, io: Io) -> Option<ResourceId> {
        self.entries.get(&(name.to_string(), io)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Io, ResourceId)> {
        self.entries.iter().map(|((name, io), id)| (name.as_str(), *io, *id))
    }
}

/// A declared parameter paired with the resource bound to it
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolvedBinding<'p> {
    pub(crate) parameter: &'p Parameter,
    pub(crate) resource: ResourceId,
}

/// Validate the table against the program's parameters
///
/// Every parameter must be bound to a live resource before any layout is
/// checked. Inputs must hold data of the declared shape and kind; outputs
/// may be empty.
pub(crate) fn resolve<'p>(
    program: &'p CompiledProgram,
    table: &BindingTable,
    resources: &HashMap<ResourceId, Storage>,
) -> Result<Vec<ResolvedBinding<'p>>> {
    let mut resolved = Vec::with_capacity(program.parameters().len());
    for parameter in program.parameters() {
        let resource = table
            .get(&parameter.name, parameter.io)
            .ok_or_else(|| Error::UnboundParameter {
                name: parameter.name.clone(),
                io: parameter.io,
            })?;
        resolved.push(ResolvedBinding { parameter, resource });
    }

    if let Some(dangling) = resolved.iter().find(|binding| !resources.contains_key(&binding.resource)) {
        return Err(Error::DanglingBinding {
            name: dangling.parameter.name.clone(),
            io: dangling.parameter.io,
        });
    }

    for binding in &resolved {
        let layout = resources.get(&binding.resource).and_then(Storage::layout);
        check_parameter(binding.parameter, layout)?;
    }

    Ok(resolved)
}

fn check_parameter(parameter: &Parameter, layout: Option<(Shape, ElementKind)>) -> Result<()> {
    match layout {
        None if parameter.io == Io::Output => Ok(()),
        None => Err(Error::shape_mismatch(
            format!("{} {} for input `{}`", parameter.kind, parameter.shape, parameter.name),
            "empty",
        )),
        Some((_, kind)) if kind != parameter.kind => Err(Error::type_mismatch(
            format!("{} for {} `{}`", parameter.kind, parameter.io, parameter.name),
            kind,
        )),
        Some((shape, _)) if shape != parameter.shape => Err(Error::shape_mismatch(
            format!("{} for {} `{}`", parameter.shape, parameter.io, parameter.name),
            shape,
        )),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_backends::compile;

    const SOURCE: &str = r#"{
        "symbol": {"0": {"Array": "U32"}, "1": {"Variable": "F32"}},
        "input": {"x": 0},
        "output": {"x": 0, "total": 1}
    }"#;

    #[test]
    fn test_bind_replaces_and_directions_coexist() {
        let mut table = BindingTable::new();
        assert_eq!(table.bind("x", Io::Input, ResourceId(1)), None);
        assert_eq!(table.bind("x", Io::Output, ResourceId(2)), None);
        assert_eq!(table.bind("x", Io::Input, ResourceId(3)), Some(ResourceId(1)));
        assert_eq!(table.len(), 2);

        assert_eq!(table.unbind("x", Io::Input), Some(ResourceId(3)));
        assert_eq!(table.unbind("x", Io::Input), None);
        assert_eq!(table.get("x", Io::Output), Some(ResourceId(2)));
    }

    #[test]
    fn test_resolve_reports_unbound_first() {
        let program = compile(SOURCE).unwrap();
        let mut table = BindingTable::new();
        table.bind("x", Io::Input, ResourceId(1));

        // The input binding is dangling too, but unbound parameters are reported first
        let err = resolve(&program, &table, &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::UnboundParameter { ref name, io: Io::Output } if name == "total"));
    }

    #[test]
    fn test_resolve_detects_dangling_binding() {
        let program = compile(SOURCE).unwrap();
        let mut table = BindingTable::new();
        table.bind("x", Io::Input, ResourceId(1));
        table.bind("x", Io::Output, ResourceId(1));
        table.bind("total", Io::Output, ResourceId(2));

        let mut resources = HashMap::new();
        resources.insert(ResourceId(2), Storage::new());
        let err = resolve(&program, &table, &resources).unwrap_err();
        assert!(matches!(err, Error::DanglingBinding { io: Io::Input, .. }));
    }

    #[test]
    fn test_outputs_may_be_empty_inputs_may_not() {
        let program = compile(SOURCE).unwrap();
        let mut table = BindingTable::new();
        table.bind("x", Io::Input, ResourceId(1));
        table.bind("x", Io::Output, ResourceId(1));
        table.bind("total", Io::Output, ResourceId(2));

        let mut resources = HashMap::new();
        resources.insert(ResourceId(1), Storage::new());
        resources.insert(ResourceId(2), Storage::new());
        assert!(matches!(
            resolve(&program, &table, &resources),
            Err(Error::ShapeMismatch { ref actual, .. }) if actual == "empty"
        ));
    }

    #[test]
    fn test_check_parameter_kind_before_shape() {
        let program = compile(SOURCE).unwrap();
        let total = program.parameter("total", Io::Output).unwrap();

        let err = check_parameter(total, Some((Shape::Array, ElementKind::U32)));
        assert!(matches!(err, Err(Error::TypeMismatch { .. })));

        let err = check_parameter(total, Some((Shape::Array, ElementKind::F32)));
        assert!(matches!(err, Err(Error::ShapeMismatch { .. })));

        assert!(check_parameter(total, Some((Shape::Scalar, ElementKind::F32))).is_ok());
    }
}
