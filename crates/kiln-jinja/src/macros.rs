//! Macro packages.
//!
//! Each package's macro files are concatenated into one template named
//! `__macros__/<package>`. A node sees its own package's macros and the
//! built-in `kiln` macros by bare name, and every package's macros as
//! `<package>.<macro>`.

use crate::error::{JinjaError, JinjaResult};
use kiln_core::MacroFile;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Package holding the built-in macros, visible from every node
pub const GLOBAL_PACKAGE: &str = "kiln";

/// Prefix for the synthetic per-package macro templates
pub const MACRO_TEMPLATE_PREFIX: &str = "__macros__/";

/// Globals a package alias must not shadow
const RESERVED_NAMES: &[&str] = &[
    "adapter",
    "already_exists",
    "config",
    "get_columns_in_table",
    "get_missing_columns",
    "invocation_id",
    "ref",
    "run_started_at",
    "state",
    "target",
    "this",
    "var",
];

/// Schema test implementations. Each query returns a single count of
/// offending rows.
pub const BUILTIN_MACROS: &str = r#"
{% macro test_not_null(model, arg) %}
select count(*)
from {{ model }}
where {{ arg }} is null
{% endmacro %}

{% macro test_unique(model, arg) %}
select count(*)
from (
    select {{ arg }}
    from {{ model }}
    where {{ arg }} is not null
    group by {{ arg }}
    having count(*) > 1
) validation_errors
{% endmacro %}

{% macro test_accepted_values(model, field, values) %}
with all_values as (
    select distinct {{ field }} as value_field
    from {{ model }}
),
validation_errors as (
    select value_field
    from all_values
    where value_field not in ({% for value in values %}'{{ value }}'{% if not loop.last %}, {% endif %}{% endfor %})
)
select count(*)
from validation_errors
{% endmacro %}

{% macro test_relationships(model, to, field, from) %}
select count(*)
from (
    select {{ from }} as id
    from {{ model }}
) as child
left join (
    select {{ field }} as id
    from {{ to }}
) as parent on parent.id = child.id
where child.id is not null
  and parent.id is null
{% endmacro %}
"#;

static MACRO_DEF_RE: OnceLock<Regex> = OnceLock::new();
static MACRO_BODY_RE: OnceLock<Regex> = OnceLock::new();
static TAG_RE: OnceLock<Regex> = OnceLock::new();
static CONTEXT_CALL_RE: OnceLock<Regex> = OnceLock::new();
static IDENT_RE: OnceLock<Regex> = OnceLock::new();

fn macro_def_re() -> &'static Regex {
    MACRO_DEF_RE
        .get_or_init(|| Regex::new(r"\{%-?\s*macro\s+(\w+)\s*\(").expect("valid regex"))
}

fn macro_body_re() -> &'static Regex {
    MACRO_BODY_RE.get_or_init(|| {
        Regex::new(r"(?s)\{%-?\s*macro\s+(\w+)\s*\(.*?\{%-?\s*endmacro\s*-?%\}")
            .expect("valid regex")
    })
}

fn tag_re() -> &'static Regex {
    TAG_RE.get_or_init(|| Regex::new(r"(?s)\{\{.*?\}\}|\{%.*?%\}").expect("valid regex"))
}

fn context_call_re() -> &'static Regex {
    CONTEXT_CALL_RE
        .get_or_init(|| Regex::new(r"\b(ref|var)\s*\(").expect("valid regex"))
}

fn ident_re() -> &'static Regex {
    IDENT_RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

/// Names of the macros defined in `contents`, in order
pub fn macro_names(contents: &str) -> Vec<String> {
    macro_def_re()
        .captures_iter(contents)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Reject macros whose bodies call `ref()` or `var()`. Macros are shared
/// between nodes, so they may not reach into a node's context.
pub fn validate_macro_file(file: &MacroFile) -> JinjaResult<()> {
    for body in macro_body_re().captures_iter(&file.contents) {
        let name = body.get(1).map(|m| m.as_str()).unwrap_or_default();
        let whole = body.get(0).map(|m| m.as_str()).unwrap_or_default();
        for tag in tag_re().find_iter(whole) {
            if let Some(call) = context_call_re().captures(tag.as_str()) {
                return Err(JinjaError::MacroMisuse {
                    file: file.path.display().to_string(),
                    name: name.to_string(),
                    call: call[1].to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Every macro known to the project, grouped by package
#[derive(Debug, Clone, Default)]
pub struct MacroRegistry {
    packages: BTreeMap<String, PackageMacros>,
}

#[derive(Debug, Clone, Default)]
struct PackageMacros {
    names: Vec<String>,
    sources: Vec<String>,
}

impl MacroRegistry {
    /// Validate and collect macro files. The built-in package is always
    /// present.
    pub fn new(files: &[MacroFile]) -> JinjaResult<Self> {
        let mut packages: BTreeMap<String, PackageMacros> = BTreeMap::new();
        packages.insert(
            GLOBAL_PACKAGE.to_string(),
            PackageMacros {
                names: macro_names(BUILTIN_MACROS),
                sources: vec![BUILTIN_MACROS.to_string()],
            },
        );
        for file in files {
            validate_macro_file(file)?;
            let entry = packages.entry(file.package.clone()).or_default();
            entry.names.extend(macro_names(&file.contents));
            entry.sources.push(file.contents.clone());
        }
        Ok(Self { packages })
    }

    /// Package names with macros
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    /// Names of the macros defined by `package`
    pub fn names(&self, package: &str) -> &[String] {
        self.packages
            .get(package)
            .map(|p| p.names.as_slice())
            .unwrap_or_default()
    }

    /// Global macro names that `package` does not override
    fn inherited_globals(&self, package: &str) -> Vec<&str> {
        let own = self.names(package);
        self.names(GLOBAL_PACKAGE)
            .iter()
            .filter(|n| package == GLOBAL_PACKAGE || !own.contains(n))
            .map(String::as_str)
            .collect()
    }

    /// `(template name, source)` for every package's macro template.
    /// Non-global packages import the inherited globals first so their
    /// macros can call them by bare name.
    pub fn templates(&self) -> Vec<(String, String)> {
        self.packages
            .iter()
            .map(|(package, macros)| {
                let mut source = String::new();
                if package != GLOBAL_PACKAGE {
                    source.push_str(&from_import(
                        GLOBAL_PACKAGE,
                        &self.inherited_globals(package),
                    ));
                }
                source.push_str(&macros.sources.join("\n"));
                (template_name(package), source)
            })
            .collect()
    }

    /// Import statements placed in front of a node from `package`. The
    /// prelude has no newlines so line numbers in errors stay accurate.
    pub fn prelude(&self, package: &str) -> String {
        let mut prelude = String::new();
        for name in self.packages.keys() {
            if !is_alias_safe(name) {
                log::debug!("Package '{}' cannot be addressed by name in templates", name);
                continue;
            }
            prelude.push_str(&format!(
                "{{% import \"{}\" as {} %}}",
                template_name(name),
                name
            ));
        }
        if package != GLOBAL_PACKAGE {
            prelude.push_str(&from_import(
                GLOBAL_PACKAGE,
                &self.inherited_globals(package),
            ));
        }
        let own: Vec<&str> = self.names(package).iter().map(String::as_str).collect();
        prelude.push_str(&from_import(package, &own));
        prelude
    }

    /// Macros `raw` appears to call, as `macro.<package>.<name>` ids
    pub fn macros_used(&self, raw: &str, package: &str) -> Vec<String> {
        let own = self.names(package);
        let mut used = Vec::new();
        for (owner, macros) in &self.packages {
            for name in &macros.names {
                let bare = owner == package || (owner == GLOBAL_PACKAGE && !own.contains(name));
                let qualified = format!(r"{}\s*\.\s*", regex::escape(owner));
                let pattern = if bare {
                    format!(r"\b({})?{}\s*\(", qualified, regex::escape(name))
                } else {
                    format!(r"\b{}{}\s*\(", qualified, regex::escape(name))
                };
                if Regex::new(&pattern).is_ok_and(|re| re.is_match(raw)) {
                    used.push(format!("macro.{}.{}", owner, name));
                }
            }
        }
        used
    }
}

pub fn template_name(package: &str) -> String {
    format!("{}{}", MACRO_TEMPLATE_PREFIX, package)
}

fn is_alias_safe(name: &str) -> bool {
    ident_re().is_match(name) && !RESERVED_NAMES.contains(&name)
}

fn from_import(package: &str, names: &[&str]) -> String {
    if names.is_empty() {
        return String::new();
    }
    format!(
        "{{% from \"{}\" import {} %}}",
        template_name(package),
        names.join(", ")
    )
}

#[cfg(test)]
#[path = "macros_test.rs"]
mod tests;
