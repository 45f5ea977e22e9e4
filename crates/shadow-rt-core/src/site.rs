//! Syntax sites, use/def categories and their capability records.
//!
//! A site is resolved once, when the host builds the corresponding AST node:
//! its category set and the identifiers each category needs are fixed at
//! that point and never re-queried per event.

use crate::error::{Result, ShadowError};
use crate::host::Host;
use crate::ids::{ClassVarName, GlobalName, LocalId, PropertyName, SiteId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Use/def classification of a syntax construct.
///
/// The declaration order is the order in which the router applies the rules
/// of a site that carries more than one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    FunctionBoundary,
    NoUseDefStack,
    UseStackDefStack,
    UseLocalDefStack,
    UseStackDefLocalStack,
    UseArgDefStack,
    UseStackDefPropertyStack,
    UsePropertyStackDefStack,
    UseStackDefReturn,
    UseClassVarDefStack,
    UseStackDefClassVar,
    UseGlobalDefStack,
    UseStackDefGlobal,
    CallNode,
}

impl Category {
    pub const ALL: [Category; 14] = [
        Category::FunctionBoundary,
        Category::NoUseDefStack,
        Category::UseStackDefStack,
        Category::UseLocalDefStack,
        Category::UseStackDefLocalStack,
        Category::UseArgDefStack,
        Category::UseStackDefPropertyStack,
        Category::UsePropertyStackDefStack,
        Category::UseStackDefReturn,
        Category::UseClassVarDefStack,
        Category::UseStackDefClassVar,
        Category::UseGlobalDefStack,
        Category::UseStackDefGlobal,
        Category::CallNode,
    ];

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::FunctionBoundary => "FunctionBoundary",
            Category::NoUseDefStack => "NoUseDefStack",
            Category::UseStackDefStack => "UseStackDefStack",
            Category::UseLocalDefStack => "UseLocalDefStack",
            Category::UseStackDefLocalStack => "UseStackDefLocalStack",
            Category::UseArgDefStack => "UseArgDefStack",
            Category::UseStackDefPropertyStack => "UseStackDefPropertyStack",
            Category::UsePropertyStackDefStack => "UsePropertyStackDefStack",
            Category::UseStackDefReturn => "UseStackDefReturn",
            Category::UseClassVarDefStack => "UseClassVarDefStack",
            Category::UseStackDefClassVar => "UseStackDefClassVar",
            Category::UseGlobalDefStack => "UseGlobalDefStack",
            Category::UseStackDefGlobal => "UseStackDefGlobal",
            Category::CallNode => "CallNode",
        }
    }

    /// Categories that record a stack depth marker on enter.
    pub fn marks_depth(&self) -> bool {
        matches!(
            self,
            Category::UseStackDefStack
                | Category::UseStackDefPropertyStack
                | Category::UsePropertyStackDefStack
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed set of categories attached to one site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CategorySet(u16);

impl CategorySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn single(category: Category) -> Self {
        Self(category.bit())
    }

    pub const fn with(self, category: Category) -> Self {
        Self(self.0 | category.bit())
    }

    pub const fn contains(&self, category: Category) -> bool {
        self.0 & category.bit() != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Members in rule-application order.
    pub fn iter(&self) -> impl Iterator<Item = Category> + '_ {
        Category::ALL.into_iter().filter(|category| self.contains(*category))
    }
}

impl FromIterator<Category> for CategorySet {
    fn from_iter<T: IntoIterator<Item = Category>>(iter: T) -> Self {
        iter.into_iter().fold(CategorySet::empty(), CategorySet::with)
    }
}

impl fmt::Display for CategorySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|category| category.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Where the argument count of a call comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgumentCount {
    /// The construct knows its count statically (e.g. the implicit receiver).
    Declared(usize),
    /// Ask the host for the current frame's actual argument count.
    FromFrame,
}

/// Capability record of an argument-binding site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentSlot {
    pub index: usize,
    pub count: ArgumentCount,
}

impl ArgumentSlot {
    pub fn new(index: usize, count: ArgumentCount) -> Self {
        Self { index, count }
    }
}

/// Capability record of a class/lexical variable site.
pub struct ClassVarSlot<H: Host> {
    pub name: ClassVarName,
    pub scope: Arc<H::Scope>,
}

impl<H: Host> ClassVarSlot<H> {
    pub fn new(name: impl Into<ClassVarName>, scope: Arc<H::Scope>) -> Self {
        Self {
            name: name.into(),
            scope,
        }
    }
}

impl<H: Host> Clone for ClassVarSlot<H> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            scope: Arc::clone(&self.scope),
        }
    }
}

impl<H: Host> fmt::Debug for ClassVarSlot<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassVarSlot")
            .field("name", &self.name)
            .field("scope", &Arc::as_ptr(&self.scope).cast::<()>())
            .finish()
    }
}

/// One tagged syntax-node instance as seen by the router.
pub struct SyntaxSite<H: Host> {
    id: SiteId,
    label: Arc<str>,
    categories: CategorySet,
    local: Option<LocalId>,
    property: Option<PropertyName>,
    class_var: Option<ClassVarSlot<H>>,
    global: Option<GlobalName>,
    argument: Option<ArgumentSlot>,
}

impl<H: Host> SyntaxSite<H> {
    pub fn builder(id: SiteId, label: impl Into<Arc<str>>) -> SyntaxSiteBuilder<H> {
        SyntaxSiteBuilder::new(id, label)
    }

    pub fn id(&self) -> SiteId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn shared_label(&self) -> Arc<str> {
        Arc::clone(&self.label)
    }

    pub fn categories(&self) -> CategorySet {
        self.categories
    }

    pub fn is_tagged(&self, category: Category) -> bool {
        self.categories.contains(category)
    }

    pub fn local(&self) -> Result<&LocalId> {
        self.local.as_ref().ok_or_else(|| self.missing("local slot"))
    }

    pub fn property(&self) -> Result<&PropertyName> {
        self.property.as_ref().ok_or_else(|| self.missing("property name"))
    }

    pub fn class_var(&self) -> Result<&ClassVarSlot<H>> {
        self.class_var.as_ref().ok_or_else(|| self.missing("class variable"))
    }

    pub fn global(&self) -> Result<&GlobalName> {
        self.global.as_ref().ok_or_else(|| self.missing("global name"))
    }

    pub fn argument(&self) -> Result<&ArgumentSlot> {
        self.argument.as_ref().ok_or_else(|| self.missing("argument slot"))
    }

    fn missing(&self, what: &str) -> ShadowError {
        ShadowError::invalid_state(format!(
            "{} ({}) has no {} capability",
            self.id, self.label, what
        ))
    }
}

impl<H: Host> Clone for SyntaxSite<H> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            label: self.label.clone(),
            categories: self.categories,
            local: self.local.clone(),
            property: self.property.clone(),
            class_var: self.class_var.clone(),
            global: self.global.clone(),
            argument: self.argument,
        }
    }
}

impl<H: Host> fmt::Debug for SyntaxSite<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntaxSite")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("categories", &self.categories)
            .field("local", &self.local)
            .field("property", &self.property)
            .field("class_var", &self.class_var)
            .field("global", &self.global)
            .field("argument", &self.argument)
            .finish()
    }
}

/// Builder for [`SyntaxSite`].
///
/// `build` checks that every category has the capability record it reads.
pub struct SyntaxSiteBuilder<H: Host> {
    site: SyntaxSite<H>,
}

impl<H: Host> SyntaxSiteBuilder<H> {
    pub fn new(id: SiteId, label: impl Into<Arc<str>>) -> Self {
        Self {
            site: SyntaxSite {
                id,
                label: label.into(),
                categories: CategorySet::empty(),
                local: None,
                property: None,
                class_var: None,
                global: None,
                argument: None,
            },
        }
    }

    pub fn category(mut self, category: Category) -> Self {
        self.site.categories = self.site.categories.with(category);
        self
    }

    pub fn categories(mut self, categories: CategorySet) -> Self {
        self.site.categories = categories;
        self
    }

    pub fn local(mut self, id: impl Into<LocalId>) -> Self {
        self.site.local = Some(id.into());
        self
    }

    pub fn property(mut self, name: impl Into<PropertyName>) -> Self {
        self.site.property = Some(name.into());
        self
    }

    pub fn class_var(mut self, name: impl Into<ClassVarName>, scope: Arc<H::Scope>) -> Self {
        self.site.class_var = Some(ClassVarSlot::new(name, scope));
        self
    }

    pub fn global(mut self, name: impl Into<GlobalName>) -> Self {
        self.site.global = Some(name.into());
        self
    }

    pub fn argument(mut self, index: usize, count: ArgumentCount) -> Self {
        self.site.argument = Some(ArgumentSlot::new(index, count));
        self
    }

    pub fn build(self) -> Result<SyntaxSite<H>> {
        let site = self.site;
        for category in site.categories.iter() {
            match category {
                Category::UseLocalDefStack | Category::UseStackDefLocalStack => {
                    site.local()?;
                }
                Category::UseStackDefPropertyStack | Category::UsePropertyStackDefStack => {
                    site.property()?;
                }
                Category::UseClassVarDefStack | Category::UseStackDefClassVar => {
                    site.class_var()?;
                }
                Category::UseGlobalDefStack | Category::UseStackDefGlobal => {
                    site.global()?;
                }
                Category::UseArgDefStack => {
                    let slot = site.argument()?;
                    if let ArgumentCount::Declared(count) = slot.count {
                        if slot.index >= count && count > 0 {
                            return Err(ShadowError::invalid_state(format!(
                                "{} binds argument {} of {}",
                                site.id, slot.index, count
                            )));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(site)
    }
}
