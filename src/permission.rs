//! The permission model: atoms, composite permissions, and the accumulated
//! permission set resolved for a user along an execution path.
//!
//! A raw grant row carries a `permission_value` string in one of three
//! shapes:
//!
//! ```text
//! ATOM=true        include the atom
//! ATOM=false       exclude the atom
//! filter=NAME      register a row-level filter service
//! service=NAME     register a programmable permission service
//! ```
//!
//! Atoms are a closed vocabulary. Composite permissions (`Union`,
//! `Intersection`) exist only on the *requested* side of a check and are
//! modelled as a tagged enum; an accumulated [`PermissionSet`] answers
//! [`PermissionSet::implies`] recursively over that shape.

use crate::trie::Accumulate;
use miette::Diagnostic;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The closed vocabulary of permission atoms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PermissionAtom {
    Create,
    Read,
    Update,
    Delete,
    View,
    Admin,
}

impl PermissionAtom {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionAtom::Create => "CREATE",
            PermissionAtom::Read => "READ",
            PermissionAtom::Update => "UPDATE",
            PermissionAtom::Delete => "DELETE",
            PermissionAtom::View => "VIEW",
            PermissionAtom::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for PermissionAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionAtom {
    type Err = GrantParseError;

    /// Case-insensitive lookup into the closed atom vocabulary.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(PermissionAtom::Create),
            "READ" => Ok(PermissionAtom::Read),
            "UPDATE" => Ok(PermissionAtom::Update),
            "DELETE" => Ok(PermissionAtom::Delete),
            "VIEW" => Ok(PermissionAtom::View),
            "ADMIN" => Ok(PermissionAtom::Admin),
            _ => Err(GrantParseError::UnknownAtom { raw: raw.into() }),
        }
    }
}

/// A requested permission: a single atom or a named composition.
///
/// # Examples
///
/// ```
/// use pathguard::permission::{Permission, PermissionAtom};
///
/// // "READ and (VIEW or ADMIN)"
/// let requested = Permission::intersection(
///     "read-and-see",
///     vec![
///         Permission::atom(PermissionAtom::Read),
///         Permission::union(
///             "see",
///             vec![
///                 Permission::atom(PermissionAtom::View),
///                 Permission::atom(PermissionAtom::Admin),
///             ],
///         ),
///     ],
/// );
/// assert_eq!(requested.to_string(), "read-and-see(READ & see(VIEW | ADMIN))");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Permission {
    Atom(PermissionAtom),
    Union {
        name: String,
        members: Vec<Permission>,
    },
    Intersection {
        name: String,
        members: Vec<Permission>,
    },
}

impl Permission {
    #[must_use]
    pub fn atom(atom: PermissionAtom) -> Self {
        Permission::Atom(atom)
    }

    pub fn union(name: impl Into<String>, members: Vec<Permission>) -> Self {
        Permission::Union {
            name: name.into(),
            members,
        }
    }

    pub fn intersection(name: impl Into<String>, members: Vec<Permission>) -> Self {
        Permission::Intersection {
            name: name.into(),
            members,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(members: &[Permission], sep: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            for (i, member) in members.iter().enumerate() {
                if i > 0 {
                    write!(f, " {sep} ")?;
                }
                write!(f, "{member}")?;
            }
            Ok(())
        }
        match self {
            Permission::Atom(atom) => write!(f, "{atom}"),
            Permission::Union { name, members } => {
                write!(f, "{name}(")?;
                join(members, "|", f)?;
                write!(f, ")")
            }
            Permission::Intersection { name, members } => {
                write!(f, "{name}(")?;
                join(members, "&", f)?;
                write!(f, ")")
            }
        }
    }
}

impl FromStr for Permission {
    type Err = GrantParseError;

    /// Parse a bare atom name. Composite permissions are built in code, not
    /// parsed from strings.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        raw.parse::<PermissionAtom>().map(Permission::Atom)
    }
}

/// One parsed grant value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrantValue {
    Include(PermissionAtom),
    Exclude(PermissionAtom),
    Filter(String),
    Service(String),
}

/// Parse the `permission_value` column grammar.
pub fn parse_grant_value(raw: &str) -> Result<GrantValue, GrantParseError> {
    let Some((lhs, rhs)) = raw.split_once('=') else {
        return Err(GrantParseError::MissingSeparator { raw: raw.into() });
    };
    if rhs.is_empty() {
        return Err(GrantParseError::EmptyValue { raw: raw.into() });
    }
    match lhs {
        "filter" => Ok(GrantValue::Filter(rhs.to_owned())),
        "service" => Ok(GrantValue::Service(rhs.to_owned())),
        atom => {
            let atom = atom.parse::<PermissionAtom>()?;
            match rhs.to_ascii_lowercase().as_str() {
                "true" => Ok(GrantValue::Include(atom)),
                "false" => Ok(GrantValue::Exclude(atom)),
                _ => Err(GrantParseError::InvalidFlag { raw: raw.into() }),
            }
        }
    }
}

/// Rejections of the grant-value grammar. Any of these aborts a permission
/// build.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum GrantParseError {
    #[error("grant value `{raw}` has no `=` separator")]
    #[diagnostic(
        code(pathguard::permission::missing_separator),
        help("grant values look like `VIEW=true`, `filter=NAME`, or `service=NAME`")
    )]
    MissingSeparator { raw: String },

    #[error("`{raw}` is not a permission atom")]
    #[diagnostic(
        code(pathguard::permission::unknown_atom),
        help("atoms are CREATE, READ, UPDATE, DELETE, VIEW, ADMIN")
    )]
    UnknownAtom { raw: String },

    #[error("grant value `{raw}` must end in `true` or `false`")]
    #[diagnostic(code(pathguard::permission::invalid_flag))]
    InvalidFlag { raw: String },

    #[error("grant value `{raw}` has an empty right-hand side")]
    #[diagnostic(code(pathguard::permission::empty_value))]
    EmptyValue { raw: String },
}

/// The permissions accumulated for one owner along a matching set of trie
/// nodes.
///
/// Merging is field-wise set union; it is commutative, associative, and
/// idempotent, so resolution order never changes the outcome. The exclude
/// set dominates: an atom present in both sets is not implied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionSet {
    owner: String,
    include: FxHashSet<PermissionAtom>,
    exclude: FxHashSet<PermissionAtom>,
    filters: FxHashSet<String>,
    services: FxHashSet<String>,
}

impl PermissionSet {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn include(&mut self, atom: PermissionAtom) -> &mut Self {
        self.include.insert(atom);
        self
    }

    pub fn exclude(&mut self, atom: PermissionAtom) -> &mut Self {
        self.exclude.insert(atom);
        self
    }

    pub fn add_filter(&mut self, name: impl Into<String>) -> &mut Self {
        self.filters.insert(name.into());
        self
    }

    pub fn add_service(&mut self, name: impl Into<String>) -> &mut Self {
        self.services.insert(name.into());
        self
    }

    /// Parse one `permission_value` string into this set.
    pub fn apply_grant_value(&mut self, raw: &str) -> Result<(), GrantParseError> {
        match parse_grant_value(raw)? {
            GrantValue::Include(atom) => self.include.insert(atom),
            GrantValue::Exclude(atom) => self.exclude.insert(atom),
            GrantValue::Filter(name) => self.filters.insert(name),
            GrantValue::Service(name) => self.services.insert(name),
        };
        Ok(())
    }

    /// Field-wise union of `other` into `self`. The owner is kept.
    pub fn merge(&mut self, other: &PermissionSet) {
        self.include.extend(other.include.iter().copied());
        self.exclude.extend(other.exclude.iter().copied());
        self.filters.extend(other.filters.iter().cloned());
        self.services.extend(other.services.iter().cloned());
    }

    /// Whether a single atom is granted: included and not excluded.
    #[must_use]
    pub fn grants_atom(&self, atom: PermissionAtom) -> bool {
        self.include.contains(&atom) && !self.exclude.contains(&atom)
    }

    /// The include set with exclusions subtracted.
    #[must_use]
    pub fn net_include(&self) -> FxHashSet<PermissionAtom> {
        self.include.difference(&self.exclude).copied().collect()
    }

    /// Whether this set satisfies a requested permission.
    ///
    /// An atom must be net-included; a union needs any member satisfied; an
    /// intersection needs every member satisfied.
    #[must_use]
    pub fn implies(&self, requested: &Permission) -> bool {
        match requested {
            Permission::Atom(atom) => self.grants_atom(*atom),
            Permission::Union { members, .. } => members.iter().any(|m| self.implies(m)),
            Permission::Intersection { members, .. } => members.iter().all(|m| self.implies(m)),
        }
    }

    #[must_use]
    pub fn filters(&self) -> &FxHashSet<String> {
        &self.filters
    }

    #[must_use]
    pub fn services(&self) -> &FxHashSet<String> {
        &self.services
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
            && self.exclude.is_empty()
            && self.filters.is_empty()
            && self.services.is_empty()
    }

    pub fn clear(&mut self) {
        self.include.clear();
        self.exclude.clear();
        self.filters.clear();
        self.services.clear();
    }
}

impl Accumulate for PermissionSet {
    fn accumulate(&mut self, other: &Self) {
        self.merge(other);
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut include: Vec<&str> = self.include.iter().map(|a| a.as_str()).collect();
        let mut exclude: Vec<&str> = self.exclude.iter().map(|a| a.as_str()).collect();
        include.sort_unstable();
        exclude.sort_unstable();
        write!(
            f,
            "{}: +{:?} -{:?} filters={} services={}",
            self.owner,
            include,
            exclude,
            self.filters.len(),
            self.services.len()
        )
    }
}
