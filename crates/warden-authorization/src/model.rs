//! Resource models
//!
//! A [`ResourceModel`] is the registration table for one protected resource
//! type. It lists the type's actions and accessors together with the markers
//! attached to each, so constraint providers can find e.g. "the accessor that
//! yields the owning tenant" without scanning runtime metadata.
//!
//! ```text
//! ResourceModel::builder::<Document>()
//!     .named("Document")
//!     .accessor("tenant", &[TENANT], |d| d.tenant.clone())
//!     .action("delete", &[TENANT_RESTRICTED])
//!     .build()?
//! ```
//!
//! Accessors are type-erased invokers: they receive the instance as `&dyn Any`
//! and fail with [`InvocationError`] instead of panicking when handed the
//! wrong type or argument count.

use std::any::{type_name, Any, TypeId};
use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use warden_core::{Result, WardenError};

/// A declarative marker attached to an action or accessor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Marker(&'static str);

impl Marker {
    /// Declare a marker
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Marker name
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Failure invoking an accessor against an instance
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvocationError {
    /// The instance is not of the accessor's resource type
    #[error("accessor '{accessor}' expects an instance of {expected}")]
    TypeMismatch {
        /// Accessor name
        accessor: String,
        /// Expected resource type
        expected: &'static str,
    },

    /// Wrong number of arguments
    #[error("accessor '{accessor}' takes {expected} argument(s), got {actual}")]
    Arity {
        /// Accessor name
        accessor: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        actual: usize,
    },

    /// The accessor itself failed or panicked
    #[error("accessor '{accessor}' failed: {message}")]
    Failed {
        /// Accessor name
        accessor: String,
        /// Failure description
        message: String,
    },
}

type Invoker =
    Arc<dyn Fn(&dyn Any, &[String]) -> std::result::Result<String, InvocationError> + Send + Sync>;

/// A named, marked accessor on a resource type
#[derive(Clone)]
pub struct AccessorDescriptor {
    name: String,
    params: Vec<&'static str>,
    markers: Vec<Marker>,
    invoker: Invoker,
}

impl AccessorDescriptor {
    /// Accessor name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter names
    pub fn params(&self) -> &[&'static str] {
        &self.params
    }

    /// Number of declared parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Markers attached to this accessor
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Whether the accessor carries `marker`
    pub fn is_marked(&self, marker: Marker) -> bool {
        self.markers.contains(&marker)
    }

    /// Invoke against an instance, converting the result to its string form
    ///
    /// Never panics: a panicking accessor is reported as [`InvocationError::Failed`].
    pub fn invoke(
        &self,
        instance: &dyn Any,
        args: &[String],
    ) -> std::result::Result<String, InvocationError> {
        if args.len() != self.params.len() {
            return Err(InvocationError::Arity {
                accessor: self.name.clone(),
                expected: self.params.len(),
                actual: args.len(),
            });
        }
        catch_unwind(AssertUnwindSafe(|| (self.invoker)(instance, args))).unwrap_or_else(
            |panic| {
                Err(InvocationError::Failed {
                    accessor: self.name.clone(),
                    message: panic_message(panic.as_ref()),
                })
            },
        )
    }
}

impl fmt::Debug for AccessorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("markers", &self.markers)
            .finish_non_exhaustive()
    }
}

/// A named, marked action on a resource type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDescriptor {
    name: String,
    markers: Vec<Marker>,
}

impl ActionDescriptor {
    /// Action name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Markers attached to this action
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Whether the action carries `marker`
    pub fn is_marked(&self, marker: Marker) -> bool {
        self.markers.contains(&marker)
    }
}

/// Registration table for one resource type
#[derive(Debug)]
pub struct ResourceModel {
    type_name: String,
    type_id: TypeId,
    actions: Vec<ActionDescriptor>,
    accessors: Vec<AccessorDescriptor>,
}

impl ResourceModel {
    /// Start describing resource type `R`
    pub fn builder<R: Any + Send + Sync>() -> ResourceModelBuilder<R> {
        ResourceModelBuilder {
            type_name: type_name::<R>().to_string(),
            actions: Vec::new(),
            accessors: Vec::new(),
            _resource: PhantomData,
        }
    }

    /// Display name of the resource type
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Rust type id of the resource type
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Whether `instance` is of this model's resource type
    pub fn accepts(&self, instance: &dyn Any) -> bool {
        instance.type_id() == self.type_id
    }

    /// Declared actions, in declaration order
    pub fn actions(&self) -> &[ActionDescriptor] {
        &self.actions
    }

    /// Look up an action by name
    pub fn action(&self, name: &str) -> Option<&ActionDescriptor> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Declared accessors, in declaration order
    pub fn accessors(&self) -> &[AccessorDescriptor] {
        &self.accessors
    }

    /// Look up an accessor by name
    pub fn accessor(&self, name: &str) -> Option<&AccessorDescriptor> {
        self.accessors.iter().find(|a| a.name == name)
    }

    /// Accessors carrying `marker`
    pub fn accessors_marked(&self, marker: Marker) -> impl Iterator<Item = &AccessorDescriptor> {
        self.accessors.iter().filter(move |a| a.is_marked(marker))
    }
}

/// Builder for [`ResourceModel`]
pub struct ResourceModelBuilder<R> {
    type_name: String,
    actions: Vec<ActionDescriptor>,
    accessors: Vec<AccessorDescriptor>,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Any + Send + Sync> ResourceModelBuilder<R> {
    /// Override the display name (defaults to the Rust type path)
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.type_name = name.into();
        self
    }

    /// Declare an action
    pub fn action(mut self, name: impl Into<String>, markers: &[Marker]) -> Self {
        self.actions.push(ActionDescriptor {
            name: name.into(),
            markers: markers.to_vec(),
        });
        self
    }

    /// Declare a parameterless accessor
    pub fn accessor<V, F>(self, name: impl Into<String>, markers: &[Marker], accessor: F) -> Self
    where
        V: ToString,
        F: Fn(&R) -> V + Send + Sync + 'static,
    {
        self.method(name, &[], markers, move |resource, _| accessor(resource))
    }

    /// Declare a parameterless accessor that can fail
    pub fn try_accessor<V, E, F>(
        self,
        name: impl Into<String>,
        markers: &[Marker],
        accessor: F,
    ) -> Self
    where
        V: ToString,
        E: fmt::Display,
        F: Fn(&R) -> std::result::Result<V, E> + Send + Sync + 'static,
    {
        self.push_accessor(name.into(), &[], markers, move |resource, _, accessor_name| {
            accessor(resource)
                .map(|v| v.to_string())
                .map_err(|e| InvocationError::Failed {
                    accessor: accessor_name.to_string(),
                    message: e.to_string(),
                })
        })
    }

    /// Declare an accessor taking string arguments
    pub fn method<V, F>(
        self,
        name: impl Into<String>,
        params: &[&'static str],
        markers: &[Marker],
        method: F,
    ) -> Self
    where
        V: ToString,
        F: Fn(&R, &[String]) -> V + Send + Sync + 'static,
    {
        self.push_accessor(name.into(), params, markers, move |resource, args, _| {
            Ok(method(resource, args).to_string())
        })
    }

    fn push_accessor<F>(
        mut self,
        name: String,
        params: &[&'static str],
        markers: &[Marker],
        call: F,
    ) -> Self
    where
        F: Fn(&R, &[String], &str) -> std::result::Result<String, InvocationError>
            + Send
            + Sync
            + 'static,
    {
        let accessor_name = name.clone();
        let invoker: Invoker = Arc::new(move |instance: &dyn Any, args: &[String]| {
            let resource =
                instance
                    .downcast_ref::<R>()
                    .ok_or_else(|| InvocationError::TypeMismatch {
                        accessor: accessor_name.clone(),
                        expected: type_name::<R>(),
                    })?;
            call(resource, args, &accessor_name)
        });
        self.accessors.push(AccessorDescriptor {
            name,
            params: params.to_vec(),
            markers: markers.to_vec(),
            invoker,
        });
        self
    }

    /// Validate and finish the model
    ///
    /// Fails with an invalid-definition error when two actions or two
    /// accessors share a name.
    pub fn build(self) -> Result<ResourceModel> {
        check_unique(&self.type_name, "action", self.actions.iter().map(|a| a.name()))?;
        check_unique(&self.type_name, "accessor", self.accessors.iter().map(|a| a.name()))?;
        Ok(ResourceModel {
            type_name: self.type_name,
            type_id: TypeId::of::<R>(),
            actions: self.actions,
            accessors: self.accessors,
        })
    }
}

fn check_unique<'a>(
    resource: &str,
    what: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<()> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(WardenError::invalid_definition(
                resource,
                format!("{what} '{name}' is declared more than once"),
            ));
        }
    }
    Ok(())
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

/// An action of a registered resource type
#[derive(Debug, Clone)]
pub struct ResourceAction {
    model: Arc<ResourceModel>,
    name: String,
    markers: Vec<Marker>,
}

impl ResourceAction {
    /// Resolve a declared action of `model`
    pub fn new(model: Arc<ResourceModel>, name: &str) -> Result<Self> {
        let markers = model
            .action(name)
            .ok_or_else(|| {
                WardenError::invalid_definition(
                    model.type_name(),
                    format!("no action named '{name}' is declared"),
                )
            })?
            .markers()
            .to_vec();
        Ok(Self {
            model,
            name: name.to_string(),
            markers,
        })
    }

    /// Model of the resource type the action belongs to
    pub fn model(&self) -> &Arc<ResourceModel> {
        &self.model
    }

    /// Action name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the action carries `marker`
    pub fn is_marked(&self, marker: Marker) -> bool {
        self.markers.contains(&marker)
    }

    /// Stable key, `Type#action`
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl PartialEq for ResourceAction {
    fn eq(&self, other: &Self) -> bool {
        self.model.type_id == other.model.type_id && self.name == other.name
    }
}

impl Eq for ResourceAction {}

impl fmt::Display for ResourceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.model.type_name, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const OWNER: Marker = Marker::new("owner");
    const AUDITED: Marker = Marker::new("audited");

    struct Invoice {
        owner: String,
        total: u32,
    }

    fn invoice_model() -> Arc<ResourceModel> {
        Arc::new(
            ResourceModel::builder::<Invoice>()
                .named("Invoice")
                .accessor("owner", &[OWNER], |i| i.owner.clone())
                .try_accessor("total", &[], |i| {
                    if i.total == 0 {
                        Err("empty invoice")
                    } else {
                        Ok(i.total)
                    }
                })
                .method("line", &["index"], &[], |i, args| format!("{}:{}", i.owner, args[0]))
                .action("pay", &[AUDITED])
                .action("view", &[])
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn accessor_invocation() {
        let model = invoice_model();
        let invoice = Invoice { owner: "acme".into(), total: 12 };

        let owner = model.accessor("owner").unwrap();
        assert_eq!(owner.invoke(&invoice, &[]).unwrap(), "acme");
        assert_eq!(model.accessor("total").unwrap().invoke(&invoice, &[]).unwrap(), "12");
        assert_eq!(
            model.accessor("line").unwrap().invoke(&invoice, &["3".into()]).unwrap(),
            "acme:3"
        );
    }

    #[test]
    fn invocation_failures_are_errors() {
        let model = invoice_model();
        let empty = Invoice { owner: "acme".into(), total: 0 };

        assert_matches!(
            model.accessor("total").unwrap().invoke(&empty, &[]),
            Err(InvocationError::Failed { .. })
        );
        assert_matches!(
            model.accessor("owner").unwrap().invoke(&"not an invoice", &[]),
            Err(InvocationError::TypeMismatch { .. })
        );
        assert_matches!(
            model.accessor("line").unwrap().invoke(&empty, &[]),
            Err(InvocationError::Arity { expected: 1, actual: 0, .. })
        );
    }

    #[test]
    fn panicking_accessor_is_contained() {
        let model = ResourceModel::builder::<Invoice>()
            .accessor("boom", &[], |_| -> String { panic!("accessor exploded") })
            .build()
            .unwrap();
        let invoice = Invoice { owner: "acme".into(), total: 1 };

        let err = model.accessor("boom").unwrap().invoke(&invoice, &[]).unwrap_err();
        assert_matches!(err, InvocationError::Failed { ref message, .. } if message == "accessor exploded");
    }

    #[test]
    fn markers_are_queryable() {
        let model = invoice_model();
        let marked: Vec<_> = model.accessors_marked(OWNER).map(|a| a.name()).collect();
        assert_eq!(marked, vec!["owner"]);
        assert!(model.action("pay").unwrap().is_marked(AUDITED));
        assert!(!model.action("view").unwrap().is_marked(AUDITED));
    }

    #[test]
    fn duplicate_names_are_definition_errors() {
        let err = ResourceModel::builder::<Invoice>()
            .action("pay", &[])
            .action("pay", &[AUDITED])
            .build()
            .unwrap_err();
        assert!(err.is_definition_error());
    }

    #[test]
    fn resource_action_key_and_lookup() {
        let model = invoice_model();
        let pay = ResourceAction::new(model.clone(), "pay").unwrap();
        assert_eq!(pay.key(), "Invoice#pay");
        assert!(pay.is_marked(AUDITED));
        assert!(model.accepts(&Invoice { owner: String::new(), total: 0 }));
        assert!(!model.accepts(&42_u8));

        assert!(ResourceAction::new(model, "refund").unwrap_err().is_definition_error());
    }
}
