//! Constraint evaluation engine
//!
//! The engine owns the installed providers and drives their lifecycle:
//!
//! ```text
//! Created ──initialize──▶ Running ──shutdown──▶ ShutDown
//!   │ install(..)            │ register / evaluate
//! ```
//!
//! Evaluation and registration hold the lifecycle lock for reading, so
//! shutdown (which takes it for writing) waits for in-flight evaluations and
//! no evaluation can start before initialization has completed. The
//! constraint cache has its own short-lived lock that is never held while an
//! authorization runs, so an authorization may evaluate other actions.
//!
//! Constraints are resolved once per action and cached by resource type id
//! and action name; display names need not be unique. Each constraint's
//! authorization is evaluated independently and the results are merged with
//! [`AuthorizationResult::merge_all`]; an action without constraints yields
//! ABSTAIN.

use crate::constraint::{Authorization, Constraint, SessionContext};
use crate::model::{panic_message, ResourceAction, ResourceModel};
use crate::provider::{ConstraintProvider, DynConstraintProvider};
use crate::result::AuthorizationResult;
use parking_lot::{Mutex, RwLock};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use warden_core::{ProviderConfig, Result, WardenError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    ShutDown,
}

/// A constraint resolved for an action, with its bound evaluator
#[derive(Debug, Clone)]
pub struct RegisteredConstraint {
    provider: String,
    constraint: Arc<dyn Constraint>,
    authorization: Arc<dyn Authorization>,
}

impl RegisteredConstraint {
    /// Name of the issuing provider
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// The constraint
    pub fn constraint(&self) -> &Arc<dyn Constraint> {
        &self.constraint
    }

    /// The bound evaluator
    pub fn authorization(&self) -> &Arc<dyn Authorization> {
        &self.authorization
    }
}

/// Cache key: resource type and action name
type ActionKey = (TypeId, String);

fn action_key(action: &ResourceAction) -> ActionKey {
    (ResourceModel::type_id(action.model()), action.name().to_string())
}

struct EngineState {
    lifecycle: Lifecycle,
    providers: Vec<Box<dyn DynConstraintProvider>>,
}

/// Lifecycle-guarded constraint evaluation over installed providers
pub struct ConstraintEngine {
    state: RwLock<EngineState>,
    constraints: Mutex<HashMap<ActionKey, Arc<[RegisteredConstraint]>>>,
}

impl Default for ConstraintEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintEngine {
    /// Create an engine with no providers
    pub fn new() -> Self {
        Self {
            state: RwLock::new(EngineState {
                lifecycle: Lifecycle::Created,
                providers: Vec::new(),
            }),
            constraints: Mutex::new(HashMap::new()),
        }
    }

    /// Install a provider; only allowed before initialization
    pub fn install<P>(&self, provider: P) -> Result<()>
    where
        P: ConstraintProvider + 'static,
    {
        self.install_boxed(Box::new(provider))
    }

    /// Install an already-erased provider
    pub fn install_boxed(&self, provider: Box<dyn DynConstraintProvider>) -> Result<()> {
        let mut state = self.state.write();
        if state.lifecycle != Lifecycle::Created {
            return Err(WardenError::illegal_state(
                "providers can only be installed before initialization",
            ));
        }
        if state.providers.iter().any(|p| p.name() == provider.name()) {
            return Err(WardenError::identity(format!(
                "constraint provider '{}' is already installed",
                provider.name()
            )));
        }
        tracing::debug!(provider = provider.name(), "Constraint provider installed");
        state.providers.push(provider);
        Ok(())
    }

    /// Initialize every provider in installation order
    ///
    /// Each provider receives the keys under `<provider name>.` with the
    /// prefix removed. If one fails, the providers initialized before it are
    /// shut down again and the engine stays uninitialized.
    pub fn initialize(&self, config: &ProviderConfig) -> Result<()> {
        let mut state = self.state.write();
        if state.lifecycle != Lifecycle::Created {
            return Err(WardenError::illegal_state(
                "constraint engine is already initialized",
            ));
        }

        for index in 0..state.providers.len() {
            let scoped = config.scoped(state.providers[index].name());
            if let Err(err) = state.providers[index].initialize(&scoped) {
                tracing::warn!(
                    provider = state.providers[index].name(),
                    error = %err,
                    "Constraint provider failed to initialize"
                );
                for provider in state.providers[..index].iter_mut().rev() {
                    provider.shutdown();
                }
                return Err(err);
            }
        }

        state.lifecycle = Lifecycle::Running;
        tracing::info!(
            providers = state.providers.len(),
            "Constraint engine initialized"
        );
        Ok(())
    }

    /// Whether the engine is between initialization and shutdown
    pub fn is_running(&self) -> bool {
        self.state.read().lifecycle == Lifecycle::Running
    }

    /// Names of installed providers, in installation order
    pub fn provider_names(&self) -> Vec<String> {
        self.state
            .read()
            .providers
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Resolve and cache the constraints for `action`
    ///
    /// Definition errors from any provider are returned and nothing is
    /// cached, so a corrected resource can be registered later.
    pub fn register(&self, action: &ResourceAction) -> Result<Vec<RegisteredConstraint>> {
        self.resolve(action).map(|constraints| constraints.to_vec())
    }

    fn resolve(&self, action: &ResourceAction) -> Result<Arc<[RegisteredConstraint]>> {
        let state = self.state.read_recursive();
        ensure_running(state.lifecycle)?;

        let key = action_key(action);
        if let Some(cached) = self.constraints.lock().get(&key) {
            return Ok(Arc::clone(cached));
        }

        let mut resolved = Vec::new();
        for provider in &state.providers {
            for constraint in provider.action_constraints(action)? {
                let authorization = provider.create_authorization(constraint.as_ref())?;
                resolved.push(RegisteredConstraint {
                    provider: provider.name().to_string(),
                    constraint,
                    authorization,
                });
            }
        }

        tracing::debug!(
            action = %action,
            constraints = resolved.len(),
            "Action constraints registered"
        );
        // a concurrent registration of the same action may have won the race
        let cached = Arc::clone(
            self.constraints
                .lock()
                .entry(key)
                .or_insert_with(|| resolved.into()),
        );
        Ok(cached)
    }

    /// Evaluate `action` on `instance` for `session`
    ///
    /// Constraints are registered on first use. The result is ABSTAIN when no
    /// constraint applies; the caller decides what ABSTAIN means.
    pub fn evaluate(
        &self,
        action: &ResourceAction,
        session: &dyn SessionContext,
        instance: &dyn Any,
    ) -> Result<AuthorizationResult> {
        let state = self.state.read_recursive();
        ensure_running(state.lifecycle)?;
        let constraints = self.resolve(action)?;

        let key = action.key();
        let result = AuthorizationResult::merge_all(
            constraints
                .iter()
                .map(|c| evaluate_one(c, &key, session, instance)),
        );
        tracing::debug!(
            action = %key,
            session = %session.session_id(),
            result = %result,
            "Action evaluated"
        );
        drop(state);
        Ok(result)
    }

    /// Evaluate and treat anything but AUTHORIZED as a denial
    pub fn authorize(
        &self,
        action: &ResourceAction,
        session: &dyn SessionContext,
        instance: &dyn Any,
    ) -> Result<()> {
        match self.evaluate(action, session, instance)? {
            AuthorizationResult::Authorized => Ok(()),
            AuthorizationResult::Denied => Err(WardenError::access_denied(
                action.key(),
                "denied by a constraint",
            )),
            AuthorizationResult::Abstain => Err(WardenError::access_denied(
                action.key(),
                "no constraint authorized the action",
            )),
        }
    }

    /// Shut providers down in reverse installation order
    ///
    /// Terminal: every later call fails with an illegal-state error. A second
    /// shutdown is a no-op.
    pub fn shutdown(&self) {
        let mut state = self.state.write();
        if state.lifecycle == Lifecycle::ShutDown {
            return;
        }
        let was_running = state.lifecycle == Lifecycle::Running;
        self.constraints.lock().clear();
        if was_running {
            for provider in state.providers.iter_mut().rev() {
                provider.shutdown();
            }
        }
        state.lifecycle = Lifecycle::ShutDown;
        tracing::info!("Constraint engine shut down");
    }
}

impl std::fmt::Debug for ConstraintEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ConstraintEngine")
            .field("lifecycle", &state.lifecycle)
            .field("providers", &state.providers.len())
            .field("cached_actions", &self.constraints.lock().len())
            .finish()
    }
}

fn ensure_running(lifecycle: Lifecycle) -> Result<()> {
    match lifecycle {
        Lifecycle::Running => Ok(()),
        Lifecycle::Created => Err(WardenError::illegal_state(
            "constraint engine is not initialized",
        )),
        Lifecycle::ShutDown => Err(WardenError::illegal_state(
            "constraint engine has been shut down",
        )),
    }
}

fn evaluate_one(
    registered: &RegisteredConstraint,
    action: &str,
    session: &dyn SessionContext,
    instance: &dyn Any,
) -> AuthorizationResult {
    catch_unwind(AssertUnwindSafe(|| {
        registered.authorization.authorize(session, instance)
    }))
    .unwrap_or_else(|panic| {
        tracing::error!(
            action,
            provider = %registered.provider,
            constraint = %registered.constraint.identity(),
            panic = %panic_message(panic.as_ref()),
            "Authorization panicked, denying"
        );
        AuthorizationResult::Denied
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Marker, ResourceModel};
    use assert_matches::assert_matches;
    use warden_core::{AssuranceLevel, SessionId, SubjectId, TenantId};

    const GUARDED: Marker = Marker::new("guarded");

    struct Report;

    struct FixedSession;

    impl SessionContext for FixedSession {
        fn subject_id(&self) -> SubjectId {
            SubjectId::default()
        }
        fn session_id(&self) -> SessionId {
            SessionId::default()
        }
        fn tenancy(&self) -> Option<TenantId> {
            None
        }
        fn assurance_level(&self) -> AssuranceLevel {
            AssuranceLevel::NONE
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Verdict(AuthorizationResult);

    impl Constraint for Verdict {
        fn identity(&self) -> String {
            format!("fixed:{}", self.0)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct VerdictAuthorization(Option<AuthorizationResult>);

    impl Authorization for VerdictAuthorization {
        fn authorize(&self, _: &dyn SessionContext, _: &dyn Any) -> AuthorizationResult {
            match self.0 {
                Some(result) => result,
                None => panic!("evaluation blew up"),
            }
        }
        fn as_string(&self) -> String {
            "verdict".into()
        }
    }

    /// Returns its fixed verdicts for guarded actions; `None` panics on evaluation
    struct FixedProvider {
        name: &'static str,
        verdicts: Vec<Option<AuthorizationResult>>,
        fail_init: bool,
        log: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    impl FixedProvider {
        fn new(name: &'static str, verdicts: Vec<Option<AuthorizationResult>>) -> Self {
            Self { name, verdicts, fail_init: false, log: Default::default() }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct MaybeVerdict(Option<AuthorizationResult>);

    impl Constraint for MaybeVerdict {
        fn identity(&self) -> String {
            format!("fixed:{:?}", self.0)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl ConstraintProvider for FixedProvider {
        type Constraint = MaybeVerdict;
        type Authorization = VerdictAuthorization;

        fn name(&self) -> &str {
            self.name
        }
        fn initialize(&mut self, _: &ProviderConfig) -> Result<()> {
            self.log.lock().push(format!("init {}", self.name));
            if self.fail_init {
                return Err(WardenError::identity("refusing to start"));
            }
            Ok(())
        }
        fn action_constraints(&self, action: &ResourceAction) -> Result<Vec<MaybeVerdict>> {
            if !action.is_marked(GUARDED) {
                return Ok(Vec::new());
            }
            Ok(self.verdicts.iter().copied().map(MaybeVerdict).collect())
        }
        fn create_authorization(&self, c: &MaybeVerdict) -> Result<VerdictAuthorization> {
            Ok(VerdictAuthorization(c.0))
        }
        fn shutdown(&mut self) {
            self.log.lock().push(format!("shutdown {}", self.name));
        }
    }

    fn model() -> Arc<ResourceModel> {
        Arc::new(
            ResourceModel::builder::<Report>()
                .named("Report")
                .action("read", &[])
                .action("publish", &[GUARDED])
                .build()
                .unwrap(),
        )
    }

    fn running(providers: Vec<FixedProvider>) -> ConstraintEngine {
        let engine = ConstraintEngine::new();
        for p in providers {
            engine.install(p).unwrap();
        }
        engine.initialize(&ProviderConfig::new()).unwrap();
        engine
    }

    use AuthorizationResult::{Abstain, Authorized, Denied};

    #[test]
    fn no_constraints_abstains() {
        let engine = running(vec![FixedProvider::new("a", vec![Some(Authorized)])]);
        let read = ResourceAction::new(model(), "read").unwrap();
        assert_eq!(engine.evaluate(&read, &FixedSession, &Report).unwrap(), Abstain);
        assert_matches!(
            engine.authorize(&read, &FixedSession, &Report),
            Err(WardenError::AccessDenied { .. })
        );
    }

    #[test]
    fn denial_dominates_across_providers() {
        let engine = running(vec![
            FixedProvider::new("a", vec![Some(Authorized), Some(Abstain)]),
            FixedProvider::new("b", vec![Some(Denied)]),
        ]);
        let publish = ResourceAction::new(model(), "publish").unwrap();
        assert_eq!(engine.evaluate(&publish, &FixedSession, &Report).unwrap(), Denied);
        assert_eq!(engine.register(&publish).unwrap().len(), 3);
    }

    #[test]
    fn authorized_when_no_denial() {
        let engine = running(vec![FixedProvider::new("a", vec![Some(Abstain), Some(Authorized)])]);
        let publish = ResourceAction::new(model(), "publish").unwrap();
        assert!(engine.authorize(&publish, &FixedSession, &Report).is_ok());
    }

    #[test]
    fn panicking_authorization_fails_closed() {
        let engine = running(vec![FixedProvider::new("a", vec![Some(Authorized), None])]);
        let publish = ResourceAction::new(model(), "publish").unwrap();
        assert_eq!(engine.evaluate(&publish, &FixedSession, &Report).unwrap(), Denied);
    }

    #[test]
    fn foreign_constraint_is_rejected() {
        let provider: Box<dyn DynConstraintProvider> =
            Box::new(FixedProvider::new("a", vec![]));
        let foreign = Verdict(Authorized);
        assert_matches!(
            provider.create_authorization(&foreign),
            Err(WardenError::UnsupportedFormat { .. })
        );
    }

    #[test]
    fn lifecycle_is_enforced() {
        let engine = ConstraintEngine::new();
        let publish = ResourceAction::new(model(), "publish").unwrap();
        assert_matches!(
            engine.evaluate(&publish, &FixedSession, &Report),
            Err(WardenError::IllegalState { .. })
        );

        engine.install(FixedProvider::new("a", vec![Some(Authorized)])).unwrap();
        engine.initialize(&ProviderConfig::new()).unwrap();
        assert!(engine.install(FixedProvider::new("b", vec![])).is_err());
        assert!(engine.initialize(&ProviderConfig::new()).is_err());

        engine.shutdown();
        assert!(!engine.is_running());
        assert_matches!(
            engine.evaluate(&publish, &FixedSession, &Report),
            Err(WardenError::IllegalState { .. })
        );
        engine.shutdown();
    }

    #[test]
    fn duplicate_provider_names_are_rejected() {
        let engine = ConstraintEngine::new();
        engine.install(FixedProvider::new("a", vec![])).unwrap();
        assert!(engine.install(FixedProvider::new("a", vec![])).unwrap_err().is_identity_error());
    }

    #[test]
    fn failed_initialization_rolls_back() {
        let log: Arc<parking_lot::Mutex<Vec<String>>> = Default::default();
        let mut first = FixedProvider::new("first", vec![]);
        first.log = log.clone();
        let mut second = FixedProvider::new("second", vec![]);
        second.log = log.clone();
        second.fail_init = true;

        let engine = ConstraintEngine::new();
        engine.install(first).unwrap();
        engine.install(second).unwrap();
        assert!(engine.initialize(&ProviderConfig::new()).is_err());
        assert!(!engine.is_running());
        assert_eq!(
            *log.lock(),
            vec!["init first", "init second", "shutdown first"]
        );
    }

    struct Draft;

    #[test]
    fn actions_of_types_sharing_a_name_are_cached_apart() {
        let engine = running(vec![FixedProvider::new("a", vec![Some(Denied)])]);
        let open = ResourceAction::new(model(), "read").unwrap();
        let guarded = ResourceAction::new(
            Arc::new(
                ResourceModel::builder::<Draft>()
                    .named("Report")
                    .action("read", &[GUARDED])
                    .build()
                    .unwrap(),
            ),
            "read",
        )
        .unwrap();
        assert_eq!(open.key(), guarded.key());

        assert_eq!(engine.evaluate(&open, &FixedSession, &Report).unwrap(), Abstain);
        assert_eq!(engine.evaluate(&guarded, &FixedSession, &Draft).unwrap(), Denied);
        assert_eq!(engine.register(&open).unwrap().len(), 0);
        assert_eq!(engine.register(&guarded).unwrap().len(), 1);
    }

    type Target = Arc<parking_lot::Mutex<Option<(std::sync::Weak<ConstraintEngine>, ResourceAction)>>>;

    /// Answers with the engine's verdict on another action
    #[derive(Debug)]
    struct Delegating(Target);

    impl Constraint for Delegating {
        fn identity(&self) -> String {
            "delegating".into()
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl Authorization for Delegating {
        fn authorize(&self, session: &dyn SessionContext, instance: &dyn Any) -> AuthorizationResult {
            let target = self.0.lock().clone();
            target
                .and_then(|(engine, action)| {
                    engine.upgrade()?.evaluate(&action, session, instance).ok()
                })
                .unwrap_or(Denied)
        }
        fn as_string(&self) -> String {
            "delegating".into()
        }
    }

    struct DelegatingProvider(Target);

    impl ConstraintProvider for DelegatingProvider {
        type Constraint = Delegating;
        type Authorization = Delegating;

        fn name(&self) -> &str {
            "delegating"
        }
        fn initialize(&mut self, _: &ProviderConfig) -> Result<()> {
            Ok(())
        }
        fn action_constraints(&self, action: &ResourceAction) -> Result<Vec<Delegating>> {
            Ok(if action.name() == "publish" {
                vec![Delegating(self.0.clone())]
            } else {
                Vec::new()
            })
        }
        fn create_authorization(&self, c: &Delegating) -> Result<Delegating> {
            Ok(Delegating(c.0.clone()))
        }
        fn shutdown(&mut self) {}
    }

    #[test]
    fn authorizations_may_evaluate_uncached_actions() {
        let target: Target = Default::default();
        let engine = Arc::new(ConstraintEngine::new());
        engine.install(DelegatingProvider(target.clone())).unwrap();
        engine.install(FixedProvider::new("fixed", vec![Some(Authorized)])).unwrap();
        engine.initialize(&ProviderConfig::new()).unwrap();

        let publish = ResourceAction::new(model(), "publish").unwrap();
        let read = ResourceAction::new(model(), "read").unwrap();
        *target.lock() = Some((Arc::downgrade(&engine), read));

        // publish: delegating (read abstains) merged with fixed AUTHORIZED
        assert_eq!(engine.evaluate(&publish, &FixedSession, &Report).unwrap(), Authorized);
        assert_eq!(engine.register(&publish).unwrap().len(), 2);
    }

    #[test]
    fn shutdown_runs_in_reverse_order() {
        let log: Arc<parking_lot::Mutex<Vec<String>>> = Default::default();
        let mut first = FixedProvider::new("first", vec![]);
        first.log = log.clone();
        let mut second = FixedProvider::new("second", vec![]);
        second.log = log.clone();

        let engine = running(vec![first, second]);
        engine.shutdown();
        assert_eq!(
            *log.lock(),
            vec!["init first", "init second", "shutdown second", "shutdown first"]
        );
    }
}
