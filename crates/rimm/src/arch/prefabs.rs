//! # Config Prefabs for Well-Known Model Configurations

use burn::config::Config;
use std::fmt::Debug;

/// Static builder for a well-known config.
pub struct StaticPreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Name of the model config pre-fab.
    pub name: &'static str,

    /// Description of the model config pre-fab.
    pub description: &'static str,

    /// Builder function for the config.
    pub builder: fn() -> C,
}

impl<C> StaticPreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Build a new config.
    pub fn new_config(&self) -> C {
        (self.builder)()
    }
}

impl<C> Debug for StaticPreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let pretty = f.alternate();

        let type_name = std::any::type_name::<C>();
        let mut handle = f.debug_struct(&format!("StaticPreFabConfig<{type_name}>"));

        handle
            .field("name", &self.name)
            .field("description", &self.description);

        if pretty {
            handle.field("config", &self.new_config());
        }

        handle.finish()
    }
}

/// A named table of [`StaticPreFabConfig`]s.
#[derive(Debug)]
pub struct StaticPreFabMap<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Name of the table.
    pub name: &'static str,

    /// Description of the table.
    pub description: &'static str,

    /// The prefabs, in listing order.
    pub items: &'static [&'static StaticPreFabConfig<C>],
}

impl<C> StaticPreFabMap<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Prefab names, in listing order.
    pub fn names(&self) -> Vec<&'static str> {
        self.items.iter().map(|item| item.name).collect()
    }

    /// Look up a prefab by name.
    pub fn lookup(
        &self,
        name: &str,
    ) -> Option<&'static StaticPreFabConfig<C>> {
        self.items.iter().copied().find(|item| item.name == name)
    }

    /// Build the config of a named prefab.
    pub fn new_config(
        &self,
        name: &str,
    ) -> Option<C> {
        self.lookup(name).map(|item| item.new_config())
    }
}
