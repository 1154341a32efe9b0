//! Built-in policy templates, embedded at compile time.
//!
//! Templates go through the same parse-and-resolve path as user files and
//! may `extends` one another or a user file.

/// One embedded template document.
pub struct Template {
    pub name: &'static str,
    pub description: &'static str,
    pub json: &'static str,
}

/// The embedded template set, named by short slugs.
pub const TEMPLATES: &[Template] = &[
    Template {
        name: "code",
        description: "development work: registries + code hosting, writes in cwd",
        json: include_str!("../../templates/code.json"),
    },
    Template {
        name: "code-relaxed",
        description: "code, plus unrestricted egress and a pty",
        json: include_str!("../../templates/code-relaxed.json"),
    },
    Template {
        name: "offline",
        description: "no network; writes in cwd",
        json: include_str!("../../templates/offline.json"),
    },
    Template {
        name: "readonly",
        description: "no network, no writes",
        json: include_str!("../../templates/readonly.json"),
    },
];

/// Look up a template by name.
pub fn find(name: &str) -> Option<&'static Template> {
    TEMPLATES.iter().find(|t| t.name == name)
}

/// Names and descriptions for `--list-templates`.
pub fn list() -> impl Iterator<Item = (&'static str, &'static str)> {
    TEMPLATES.iter().map(|t| (t.name, t.description))
}
