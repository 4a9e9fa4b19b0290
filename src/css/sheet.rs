//! Editable stylesheet on top of the lightningcss rule tree.
//!
//! The rule tree borrows from its source text, so a [`Stylesheet`] keeps the
//! text as lightningcss prints it and reparses it for every edit. Reads go
//! through a declaration index rebuilt after each edit.
//!
//! Rules are numbered in document order. Edits only touch declarations, so
//! rule numbers never move. Declarations are addressed through a side table
//! of `(rule, important, index)` slots that inserts and removals shift.

use std::fmt;

use lightningcss::declaration::DeclarationBlock;
use lightningcss::properties::{Property, PropertyId};
use lightningcss::rules::font_face::FontFaceProperty;
use lightningcss::rules::import::ImportRule;
use lightningcss::rules::{CssRule, CssRuleList};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::traits::ToCss;
use lightningcss::visitor::Visit;
use rustc_hash::FxHashMap;

use super::visit::{CollectUrls, ReplaceUrl};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclarationId(pub(crate) u32);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule#{}", self.0)
    }
}

/// Where a declaration sits inside its rule's block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Slot {
    rule: RuleId,
    important: bool,
    index: usize,
}

/// A declaration as seen by relation discovery and transforms.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub id: DeclarationId,
    pub rule: RuleId,
    /// Lowercased, without vendor prefix.
    pub property: String,
    pub value: String,
    pub important: bool,
    /// Declared inside an `@font-face` block.
    pub font_face: bool,
    /// `url()` references in value order.
    pub urls: Vec<String>,
}

/// An `@import` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub rule: RuleId,
    pub href: String,
}

/// A parsed stylesheet.
#[derive(Debug, Clone, PartialEq)]
pub struct Stylesheet {
    code: String,
    slots: Vec<Option<Slot>>,
    declarations: Vec<Declaration>,
    imports: Vec<Import>,
    rule_count: u32,
}

impl Stylesheet {
    /// Parse with lightningcss. Errors carry the lightningcss message.
    pub fn parse(source: &str) -> Result<Self, String> {
        let sheet = parse(source)?;
        let code = print(&sheet)?;
        let mut stylesheet = Self {
            code: String::new(),
            slots: Vec::new(),
            declarations: Vec::new(),
            imports: Vec::new(),
            rule_count: 0,
        };
        stylesheet.commit(code)?;
        Ok(stylesheet)
    }

    /// Serialized form, as printed by lightningcss.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Every declaration in document order.
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn imports(&self) -> &[Import] {
        &self.imports
    }

    pub fn rule_count(&self) -> usize {
        self.rule_count as usize
    }

    pub fn declaration(&self, rule: RuleId, id: DeclarationId) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.id == id && d.rule == rule)
    }

    fn slot(&self, rule: RuleId, id: DeclarationId) -> Result<Slot, String> {
        self.slots
            .get(id.0 as usize)
            .copied()
            .flatten()
            .filter(|slot| slot.rule == rule)
            .ok_or_else(|| format!("no declaration {} in {rule}", id.0))
    }

    /// Insert `property: value` right after `after`, with the same importance.
    pub fn insert_declaration_after(
        &mut self,
        rule: RuleId,
        after: DeclarationId,
        property: &str,
        value: &str,
    ) -> Result<DeclarationId, String> {
        let slot = self.slot(rule, after)?;
        let source = self.code.clone();
        let mut sheet = parse(&source)?;
        let declaration = Property::parse_string(PropertyId::from(property), value, ParserOptions::default())
            .map_err(|e| format!("invalid `{property}: {value}`: {e:?}"))?;

        let mut declaration = Some(declaration);
        with_block(&mut sheet.rules, rule, |block| {
            let Block::Declarations(block) = block else {
                return false;
            };
            let list = properties(block, slot.important);
            match declaration.take() {
                Some(declaration) if slot.index < list.len() => {
                    list.insert(slot.index + 1, declaration);
                    true
                }
                _ => false,
            }
        })
        .then_some(())
        .ok_or_else(|| format!("cannot insert into {rule}"))?;

        let code = print(&sheet)?;
        self.shift(slot, 1);
        self.commit(code)?;

        let inserted = Slot {
            index: slot.index + 1,
            ..slot
        };
        self.slots
            .iter()
            .position(|s| *s == Some(inserted))
            .map(|i| DeclarationId(i as u32))
            .ok_or_else(|| format!("inserted declaration missing from {rule}"))
    }

    pub fn remove_declaration(&mut self, rule: RuleId, id: DeclarationId) -> Result<Declaration, String> {
        let slot = self.slot(rule, id)?;
        let removed = self
            .declaration(rule, id)
            .cloned()
            .ok_or_else(|| format!("no declaration {} in {rule}", id.0))?;
        let source = self.code.clone();
        let mut sheet = parse(&source)?;

        let done = with_block(&mut sheet.rules, rule, |block| match block {
            Block::Declarations(block) => {
                let list = properties(block, slot.important);
                (slot.index < list.len()).then(|| list.remove(slot.index)).is_some()
            }
            Block::FontFace(list) => (slot.index < list.len()).then(|| list.remove(slot.index)).is_some(),
            _ => false,
        });
        if !done {
            return Err(format!("cannot remove from {rule}"));
        }

        let code = print(&sheet)?;
        self.slots[id.0 as usize] = None;
        self.shift(slot, -1);
        self.commit(code)?;
        Ok(removed)
    }

    /// Rewrite the `index`-th `url()` of a declaration.
    pub fn set_url(&mut self, rule: RuleId, id: DeclarationId, index: usize, href: &str) -> Result<(), String> {
        let slot = self.slot(rule, id)?;
        let source = self.code.clone();
        let mut sheet = parse(&source)?;

        let mut visitor = ReplaceUrl::new(index, href);
        with_block(&mut sheet.rules, rule, |block| {
            match block {
                Block::Declarations(block) => {
                    if let Some(property) = properties(block, slot.important).get_mut(slot.index) {
                        let _ = property.visit(&mut visitor);
                    }
                }
                Block::FontFace(list) => {
                    if let Some(property) = list.get_mut(slot.index) {
                        let _ = property.visit(&mut visitor);
                    }
                }
                _ => {}
            }
            true
        });
        if !visitor.replaced() {
            return Err(format!("no url #{index} in declaration {} of {rule}", id.0));
        }

        let code = print(&sheet)?;
        self.commit(code)
    }

    /// Rewrite the href of an `@import` rule, keeping its media list.
    pub fn set_import(&mut self, rule: RuleId, href: &str) -> Result<(), String> {
        let source = self.code.clone();
        let mut sheet = parse(&source)?;

        let done = with_block(&mut sheet.rules, rule, |block| match block {
            Block::Import(import) => {
                import.url = href.to_string().into();
                true
            }
            _ => false,
        });
        if !done {
            return Err(format!("{rule} is not an @import"));
        }

        let code = print(&sheet)?;
        self.commit(code)
    }

    /// Move slots after `at` in the same list by `delta`.
    fn shift(&mut self, at: Slot, delta: isize) {
        for slot in self.slots.iter_mut().flatten() {
            if slot.rule == at.rule && slot.important == at.important && slot.index > at.index {
                slot.index = slot.index.saturating_add_signed(delta);
            }
        }
    }

    /// Adopt freshly printed code and rebuild the declaration index from it.
    fn commit(&mut self, code: String) -> Result<(), String> {
        let mut sheet = parse(&code)?;
        let lookup: FxHashMap<Slot, DeclarationId> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|slot| (slot, DeclarationId(i as u32))))
            .collect();

        let slots = &mut self.slots;
        let mut id_for = |slot: Slot| {
            lookup.get(&slot).copied().unwrap_or_else(|| {
                slots.push(Some(slot));
                DeclarationId(slots.len() as u32 - 1)
            })
        };

        let mut declarations = Vec::new();
        let mut imports = Vec::new();
        let rule_count = walk(&mut sheet.rules, &mut |rule, block| match block {
            Block::Declarations(block) => {
                for important in [false, true] {
                    for (index, property) in properties(block, important).iter_mut().enumerate() {
                        let mut urls = CollectUrls::default();
                        let _ = property.visit(&mut urls);
                        declarations.push(Declaration {
                            id: id_for(Slot { rule, important, index }),
                            rule,
                            property: property.property_id().name().to_ascii_lowercase(),
                            value: property
                                .value_to_css_string(PrinterOptions::default())
                                .unwrap_or_default(),
                            important,
                            font_face: false,
                            urls: urls.into_inner(),
                        });
                    }
                }
            }
            Block::FontFace(list) => {
                for (index, property) in list.iter_mut().enumerate() {
                    let mut urls = CollectUrls::default();
                    let _ = property.visit(&mut urls);
                    let text = property.to_css_string(PrinterOptions::default()).unwrap_or_default();
                    let (name, value) = text.split_once(':').unwrap_or((text.as_str(), ""));
                    declarations.push(Declaration {
                        id: id_for(Slot {
                            rule,
                            important: false,
                            index,
                        }),
                        rule,
                        property: name.trim().to_ascii_lowercase(),
                        value: value.trim().to_string(),
                        important: false,
                        font_face: true,
                        urls: urls.into_inner(),
                    });
                }
            }
            Block::Import(import) => imports.push(Import {
                rule,
                href: import.url.to_string(),
            }),
            Block::Group => {}
        });
        drop(sheet);

        self.code = code;
        self.declarations = declarations;
        self.imports = imports;
        self.rule_count = rule_count;
        Ok(())
    }
}

fn parse(code: &str) -> Result<StyleSheet<'_>, String> {
    StyleSheet::parse(code, ParserOptions::default()).map_err(|e| e.to_string())
}

fn print(sheet: &StyleSheet<'_>) -> Result<String, String> {
    sheet
        .to_css(PrinterOptions::default())
        .map(|out| out.code)
        .map_err(|e| e.to_string())
}

fn properties<'a, 'i>(block: &'a mut DeclarationBlock<'i>, important: bool) -> &'a mut Vec<Property<'i>> {
    if important {
        &mut block.important_declarations
    } else {
        &mut block.declarations
    }
}

/// What a numbered rule holds.
enum Block<'a, 'i> {
    Declarations(&'a mut DeclarationBlock<'i>),
    FontFace(&'a mut Vec<FontFaceProperty<'i>>),
    Import(&'a mut ImportRule<'i>),
    /// Grouping rules and statements without declarations.
    Group,
}

/// Visit every rule in document order. Returns the number of rules seen.
///
/// Keyframes and page margin boxes get their own numbers after the rule
/// that contains them.
fn walk<'i>(rules: &mut CssRuleList<'i>, f: &mut dyn FnMut(RuleId, Block<'_, 'i>)) -> u32 {
    let mut next = 0;
    walk_list(rules, &mut next, f);
    next
}

fn walk_list<'i>(rules: &mut CssRuleList<'i>, next: &mut u32, f: &mut dyn FnMut(RuleId, Block<'_, 'i>)) {
    let mut bump = |next: &mut u32| {
        let id = RuleId(*next);
        *next += 1;
        id
    };

    for rule in &mut rules.0 {
        let id = bump(next);
        match rule {
            CssRule::Style(style) => {
                f(id, Block::Declarations(&mut style.declarations));
                walk_list(&mut style.rules, next, f);
            }
            CssRule::Nesting(nesting) => {
                f(id, Block::Declarations(&mut nesting.style.declarations));
                walk_list(&mut nesting.style.rules, next, f);
            }
            CssRule::NestedDeclarations(nested) => f(id, Block::Declarations(&mut nested.declarations)),
            CssRule::PositionTry(position) => f(id, Block::Declarations(&mut position.declarations)),
            CssRule::FontFace(face) => f(id, Block::FontFace(&mut face.properties)),
            CssRule::Import(import) => f(id, Block::Import(import)),
            CssRule::Page(page) => {
                f(id, Block::Declarations(&mut page.declarations));
                for margin in &mut page.rules {
                    f(bump(next), Block::Declarations(&mut margin.declarations));
                }
            }
            CssRule::Keyframes(keyframes) => {
                f(id, Block::Group);
                for frame in &mut keyframes.keyframes {
                    f(bump(next), Block::Declarations(&mut frame.declarations));
                }
            }
            other => {
                f(id, Block::Group);
                if let Some(children) = child_rules(other) {
                    walk_list(children, next, f);
                }
            }
        }
    }
}

fn child_rules<'a, 'i>(rule: &'a mut CssRule<'i>) -> Option<&'a mut CssRuleList<'i>> {
    match rule {
        CssRule::Media(r) => Some(&mut r.rules),
        CssRule::Supports(r) => Some(&mut r.rules),
        CssRule::LayerBlock(r) => Some(&mut r.rules),
        CssRule::Container(r) => Some(&mut r.rules),
        CssRule::Scope(r) => Some(&mut r.rules),
        CssRule::StartingStyle(r) => Some(&mut r.rules),
        CssRule::MozDocument(r) => Some(&mut r.rules),
        _ => None,
    }
}

/// Run `f` on the block of one rule. False when the rule does not exist or
/// `f` declined.
fn with_block<'i>(rules: &mut CssRuleList<'i>, target: RuleId, f: impl FnOnce(Block<'_, 'i>) -> bool) -> bool {
    let mut f = Some(f);
    let mut done = false;
    walk(rules, &mut |rule, block| {
        if rule == target
            && let Some(f) = f.take()
        {
            done = f(block);
        }
    });
    done
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties_of(sheet: &Stylesheet, rule: RuleId) -> Vec<&str> {
        sheet
            .declarations()
            .iter()
            .filter(|d| d.rule == rule)
            .map(|d| d.property.as_str())
            .collect()
    }

    #[test]
    fn test_nested_rules() {
        let sheet = Stylesheet::parse(".a { color: red; &:hover { background-image: url(a.png); } }").unwrap();

        assert_eq!(sheet.rule_count(), 2);
        let image = sheet
            .declarations()
            .iter()
            .find(|d| d.property == "background-image")
            .unwrap();
        assert_eq!(image.rule, RuleId(1));
        assert_eq!(image.urls, ["a.png"]);
        assert_eq!(properties_of(&sheet, RuleId(0)), ["color"]);
    }

    #[test]
    fn test_insert_and_remove_keep_ids() {
        let mut sheet = Stylesheet::parse(".a { color: red; margin: 0; }").unwrap();
        let rule = RuleId(0);
        let color = sheet.declarations()[0].id;
        let margin = sheet.declarations()[1].id;

        let inserted = sheet
            .insert_declaration_after(rule, color, "background-color", "blue")
            .unwrap();
        assert_eq!(properties_of(&sheet, rule), ["color", "background-color", "margin"]);

        let removed = sheet.remove_declaration(rule, color).unwrap();
        assert_eq!(removed.property, "color");
        assert!(sheet.declaration(rule, color).is_none());
        assert_eq!(sheet.declaration(rule, inserted).unwrap().property, "background-color");
        assert_eq!(sheet.declaration(rule, margin).unwrap().property, "margin");
        assert!(!sheet.code().contains("red"));
    }

    #[test]
    fn test_important_declarations() {
        let sheet = Stylesheet::parse(".a { color: red !important; margin: 0 }").unwrap();
        let summary: Vec<(&str, bool)> = sheet
            .declarations()
            .iter()
            .map(|d| (d.property.as_str(), d.important))
            .collect();
        assert_eq!(summary, [("margin", false), ("color", true)]);
    }

    #[test]
    fn test_unknown_property_is_kept() {
        let sheet = Stylesheet::parse(".a { -asset-image-postprocess: resize(10, 20) grayscale; }").unwrap();
        let decl = &sheet.declarations()[0];
        assert_eq!(decl.property, "-asset-image-postprocess");
        assert!(decl.value.starts_with("resize(10"));
        assert!(decl.value.ends_with("grayscale"));
    }

    #[test]
    fn test_set_url_and_import() {
        let mut sheet = Stylesheet::parse(
            "@import url(base.css) screen;\n.a { background: url(a.png) no-repeat, url('b.png'); }",
        )
        .unwrap();
        let decl = sheet.declarations()[0].clone();
        assert_eq!(decl.urls, ["a.png", "b.png"]);

        sheet.set_url(decl.rule, decl.id, 1, "c d.png").unwrap();
        assert_eq!(sheet.declaration(decl.rule, decl.id).unwrap().urls, ["a.png", "c d.png"]);
        assert!(sheet.set_url(decl.rule, decl.id, 2, "e.png").is_err());

        let import = sheet.imports()[0].rule;
        sheet.set_import(import, "theme.css").unwrap();
        assert_eq!(sheet.imports()[0].href, "theme.css");
        assert!(sheet.code().contains("screen"));
        assert!(sheet.set_import(decl.rule, "x.css").is_err());
    }

    #[test]
    fn test_keyframes_are_numbered() {
        let sheet = Stylesheet::parse(
            "@keyframes fade { from { background-image: url(a.png); } to { opacity: 0; } }\n.b { color: red; }",
        )
        .unwrap();
        assert_eq!(sheet.rule_count(), 4);
        assert_eq!(sheet.declarations()[0].urls, ["a.png"]);
        assert_eq!(sheet.declarations()[0].rule, RuleId(1));
        assert_eq!(properties_of(&sheet, RuleId(3)), ["color"]);
    }

    #[test]
    fn test_rejects_invalid_selector() {
        assert!(Stylesheet::parse("..a { color: red; }").is_err());
    }
}
