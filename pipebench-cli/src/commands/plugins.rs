//! `pipebench plugins` command handler

use std::io::Write;

use serde::Serialize;

use pipebench_core::plugin::{Registries, with_global};

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `plugins` command.
pub fn execute(writer: &OutputWriter) -> Result<(), CliError> {
    let list = with_global(PluginList::from_registries);
    writer.render(&list)
}

/// Registered plugin names per kind.
#[derive(Debug, Serialize)]
pub struct PluginList {
    pub components: Vec<String>,
    pub actions: Vec<String>,
    pub hooks: Vec<String>,
}

impl PluginList {
    pub fn from_registries(registries: &Registries) -> Self {
        let owned = |names: Vec<&str>| -> Vec<String> { names.into_iter().map(str::to_owned).collect() };
        Self {
            components: owned(registries.components.names()),
            actions: owned(registries.actions.names()),
            hooks: owned(registries.hooks.names()),
        }
    }
}

impl Render for PluginList {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        for (kind, names) in [
            ("component", &self.components),
            ("action", &self.actions),
            ("hook", &self.hooks),
        ] {
            writeln!(w, "{kind} ({}):", names.len())?;
            for name in names {
                writeln!(w, "  {name}")?;
            }
        }
        Ok(())
    }
}
