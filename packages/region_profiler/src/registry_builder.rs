use crate::Registry;
use crate::pal::ClockFacade;

pub(crate) const DEFAULT_ROOT_NAME: &str = "root";

/// Creates instances of [`Registry`].
///
/// All parameters are optional. Use `Registry::builder()` to create a new instance of this
/// builder.
#[derive(Debug)]
#[must_use]
pub struct RegistryBuilder {
    /// Name of the root region of every profiler in the registry.
    ///
    /// Trees can only be fused if their roots have the same name, so all profilers of one
    /// registry share it.
    root_name: Box<str>,

    clock: ClockFacade,
}

impl RegistryBuilder {
    pub(crate) fn new() -> Self {
        Self {
            root_name: DEFAULT_ROOT_NAME.into(),
            clock: ClockFacade::real(),
        }
    }

    /// Sets the name of the root region of every profiler created by the registry.
    ///
    /// The default is `"root"`.
    ///
    /// # Example
    ///
    /// ```
    /// use region_profiler::Registry;
    ///
    /// let mut registry = Registry::builder().root_name("simulation").build();
    /// registry.local().enter("step").unwrap();
    ///
    /// let report = registry.produce_report(0.0, None).unwrap();
    /// assert_eq!(report.regions().name(), "simulation");
    /// ```
    pub fn root_name(self, name: impl Into<Box<str>>) -> Self {
        Self {
            root_name: name.into(),
            ..self
        }
    }

    #[cfg(test)]
    pub(crate) fn clock(self, clock: ClockFacade) -> Self {
        Self { clock, ..self }
    }

    /// Creates the registry.
    #[must_use]
    pub fn build(self) -> Registry {
        Registry::new_inner(self.root_name, self.clock)
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
