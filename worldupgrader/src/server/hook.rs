use std::{
    collections::{HashMap, HashSet},
    error::Error,
    fmt, mem,
};

use log::{debug, warn};
use thiserror::Error;

/// Points during server bring-up where registered hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// After core initialization, before the first tick.
    AfterServerInit,
    /// After every dimension was prepared. Reserved, hooks here never fire.
    AfterLevelPreparation,
}

impl HookPoint {
    pub const fn is_active(self) -> bool {
        matches!(self, HookPoint::AfterServerInit)
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookPoint::AfterServerInit => "after server init",
            HookPoint::AfterLevelPreparation => "after level preparation",
        })
    }
}

pub type HookError = Box<dyn Error + Send + Sync>;

/// A hook gets exclusive access to its host for as long as it runs.
pub type Hook<H> = Box<dyn FnMut(&mut H) -> Result<(), HookError>>;

#[derive(Error, Debug)]
#[error("Hook {point} failed: {source}")]
pub struct HookFailure {
    pub point: HookPoint,
    #[source]
    pub source: HookError,
}

/// Something that owns a [`Hooks`] registry and hands itself to the hooks.
pub trait HookHost: Sized {
    fn hooks(&mut self) -> &mut Hooks<Self>;
}

pub struct Hooks<H> {
    registered: HashMap<HookPoint, Vec<Hook<H>>>,
    fired: HashSet<HookPoint>,
}

impl<H> Hooks<H> {
    pub fn new() -> Self {
        Self {
            registered: HashMap::new(),
            fired: HashSet::new(),
        }
    }

    pub fn register(&mut self, point: HookPoint, hook: Hook<H>) {
        if !point.is_active() {
            warn!("Registering a hook {}, which is reserved and never fires", point);
        }
        self.registered.entry(point).or_default().push(hook);
    }

    pub fn registered(&self, point: HookPoint) -> usize {
        self.registered.get(&point).map_or(0, Vec::len)
    }

    pub fn has_fired(&self, point: HookPoint) -> bool {
        self.fired.contains(&point)
    }

    fn take(&mut self, point: HookPoint) -> Vec<Hook<H>> {
        self.registered
            .get_mut(&point)
            .map(mem::take)
            .unwrap_or_default()
    }

    /// Puts hooks back in front of any registered while they ran.
    fn restore(&mut self, point: HookPoint, hooks: Vec<Hook<H>>) {
        let slot = self.registered.entry(point).or_default();
        let added = mem::replace(slot, hooks);
        slot.extend(added);
    }
}

impl<H> Default for Hooks<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the hooks registered at `point`, in registration order, at most once per
/// host. Returns how many ran. The first failing hook stops the rest.
pub fn fire<H: HookHost>(host: &mut H, point: HookPoint) -> Result<usize, HookFailure> {
    if !point.is_active() {
        debug!("Hook point {} is disabled, skipping", point);
        return Ok(0);
    }
    if !host.hooks().fired.insert(point) {
        warn!("Hook point {} already fired, ignoring", point);
        return Ok(0);
    }

    let mut hooks = host.hooks().take(point);
    let mut ran = 0;
    let mut result = Ok(());
    for hook in &mut hooks {
        result = hook(host);
        if result.is_err() {
            break;
        }
        ran += 1;
    }
    host.hooks().restore(point, hooks);
    result.map(|()| ran).map_err(|source| HookFailure { point, source })
}
