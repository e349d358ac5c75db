//! Minimal CSS selector engine for querying a parsed DomNode tree.
//! Supports: tag, .class, #id, [attr], [attr="value"], combinators
//! (descendant, child), comma-separated selectors, and the structural
//! pseudo-classes :nth-child(n), :first-child and :last-child.

use super::DomNode;

/// A comma-separated list of selectors.
#[derive(Debug, Clone)]
pub struct SelectorList {
    pub selectors: Vec<Selector>,
}

/// A single selector (one part of a comma-separated list).
#[derive(Debug, Clone)]
pub struct Selector {
    pub parts: Vec<SelectorPart>,
}

/// A component of a selector chain.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectorPart {
    /// Matches a tag name: `div`, `button`, etc.
    Tag(String),
    /// Matches a class: `.foo`
    Class(String),
    /// Matches an ID: `#bar`
    Id(String),
    /// Matches an attribute: `[type="submit"]`
    Attribute(String, Option<String>),
    /// Descendant combinator (space)
    Descendant,
    /// Child combinator (>)
    Child,
    /// Universal selector (*)
    Universal,
    /// `:nth-child(n)`, 1-based
    NthChild(usize),
    /// `:first-child`
    FirstChild,
    /// `:last-child`
    LastChild,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Combinator {
    Descendant,
    Child,
}

/// A run of simple selectors, plus the combinator that links it to the
/// compound on its left.
#[derive(Debug)]
struct Compound<'a> {
    parts: Vec<&'a SelectorPart>,
    combinator: Option<Combinator>,
}

/// Position of an element among its element siblings.
#[derive(Debug, Clone, Copy)]
struct Context<'a> {
    node: &'a DomNode,
    position: usize,
    siblings: usize,
}

impl SelectorList {
    /// Parse a comma-separated selector list. Returns `None` when any part
    /// uses syntax the engine does not support.
    pub fn parse(input: &str) -> Option<Self> {
        let mut selectors = Vec::new();
        for sel_str in split_list(input) {
            let sel_str = sel_str.trim();
            if sel_str.is_empty() {
                continue;
            }
            selectors.push(parse_selector(sel_str)?);
        }
        if selectors.is_empty() {
            None
        } else {
            Some(Self { selectors })
        }
    }

    /// All descendants of `root` matching any selector, in document order.
    pub fn select_all<'a>(&self, root: &'a DomNode) -> Vec<&'a DomNode> {
        let compiled: Vec<Vec<Compound>> = self.selectors.iter().map(compile).collect();
        let mut out = Vec::new();
        let mut chain = vec![Context {
            node: root,
            position: 1,
            siblings: 1,
        }];
        walk(root, &compiled, &mut chain, &mut out);
        out
    }

    /// Whether `node`, seen with the given ancestor chain (root first),
    /// matches any selector in the list.
    pub fn matches(&self, node: &DomNode, ancestors: &[&DomNode]) -> bool {
        let mut chain: Vec<Context> = Vec::with_capacity(ancestors.len() + 1);
        for (i, anc) in ancestors.iter().enumerate() {
            let parent = if i == 0 { None } else { Some(ancestors[i - 1]) };
            chain.push(context_in(anc, parent));
        }
        chain.push(context_in(node, ancestors.last().copied()));
        self.selectors
            .iter()
            .map(compile)
            .any(|compound| {
                !compound.is_empty()
                    && match_at(&compound, compound.len() - 1, &chain, chain.len() - 1)
            })
    }
}

fn context_in<'a>(node: &'a DomNode, parent: Option<&'a DomNode>) -> Context<'a> {
    match parent {
        Some(parent) => {
            let mut position = 1;
            let mut siblings = 0;
            for child in parent.element_children() {
                siblings += 1;
                if std::ptr::eq(child, node) {
                    position = siblings;
                }
            }
            Context {
                node,
                position,
                siblings: siblings.max(1),
            }
        }
        None => Context {
            node,
            position: 1,
            siblings: 1,
        },
    }
}

fn walk<'a>(
    node: &'a DomNode,
    compiled: &[Vec<Compound>],
    chain: &mut Vec<Context<'a>>,
    out: &mut Vec<&'a DomNode>,
) {
    let siblings = node.element_children().count();
    let mut position = 0;
    for child in &node.children {
        if !child.is_element() {
            continue;
        }
        position += 1;
        chain.push(Context {
            node: child,
            position,
            siblings,
        });
        let last = chain.len() - 1;
        if compiled
            .iter()
            .any(|compound| {
                !compound.is_empty() && match_at(compound, compound.len() - 1, chain, last)
            })
        {
            out.push(child);
        }
        walk(child, compiled, chain, out);
        chain.pop();
    }
}

/// Split `a, b` at top-level commas (commas inside quotes or brackets stay).
fn split_list(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '[') | (None, '(') => depth += 1,
            (None, ']') | (None, ')') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Parse a single selector string into a Selector.
fn parse_selector(input: &str) -> Option<Selector> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            '.' => {
                flush_tag(&mut current, &mut parts);
                chars.next();
                let class_name = read_ident(&mut chars);
                if class_name.is_empty() {
                    return None;
                }
                parts.push(SelectorPart::Class(class_name));
            }
            '#' => {
                flush_tag(&mut current, &mut parts);
                chars.next();
                let id_name = read_ident(&mut chars);
                if id_name.is_empty() {
                    return None;
                }
                parts.push(SelectorPart::Id(id_name));
            }
            '[' => {
                flush_tag(&mut current, &mut parts);
                chars.next();
                let mut attr = String::new();
                let mut value = None;
                let mut closed = false;
                while let Some(&c) = chars.peek() {
                    if c == ']' {
                        chars.next();
                        closed = true;
                        break;
                    }
                    if c == '=' {
                        chars.next();
                        let mut val = String::new();
                        // Skip optional quotes
                        let quote = chars.peek().copied().filter(|q| *q == '"' || *q == '\'');
                        if let Some(q) = quote {
                            chars.next();
                            while let Some(&vc) = chars.peek() {
                                chars.next();
                                if vc == q {
                                    break;
                                }
                                val.push(vc);
                            }
                        } else {
                            while let Some(&vc) = chars.peek() {
                                if vc == ']' {
                                    break;
                                }
                                val.push(vc);
                                chars.next();
                            }
                        }
                        value = Some(val);
                    } else {
                        attr.push(c);
                        chars.next();
                    }
                }
                if !closed || attr.trim().is_empty() {
                    return None;
                }
                parts.push(SelectorPart::Attribute(attr.trim().to_string(), value));
            }
            ':' => {
                flush_tag(&mut current, &mut parts);
                chars.next();
                let pseudo = read_ident(&mut chars);
                let part = match pseudo.as_str() {
                    "first-child" => SelectorPart::FirstChild,
                    "last-child" => SelectorPart::LastChild,
                    "nth-child" => {
                        if chars.next() != Some('(') {
                            return None;
                        }
                        let mut arg = String::new();
                        for c in chars.by_ref() {
                            if c == ')' {
                                break;
                            }
                            arg.push(c);
                        }
                        let n: usize = arg.trim().parse().ok()?;
                        if n == 0 {
                            return None;
                        }
                        SelectorPart::NthChild(n)
                    }
                    _ => return None,
                };
                parts.push(part);
            }
            '>' => {
                flush_tag(&mut current, &mut parts);
                chars.next();
                skip_whitespace(&mut chars);
                parts.push(SelectorPart::Child);
            }
            ' ' | '\t' | '\n' | '\r' => {
                flush_tag(&mut current, &mut parts);
                chars.next();
                skip_whitespace(&mut chars);
                // Check if next char is a combinator
                if let Some(&next) = chars.peek() {
                    if next != '>' {
                        parts.push(SelectorPart::Descendant);
                    }
                }
            }
            '*' => {
                flush_tag(&mut current, &mut parts);
                chars.next();
                parts.push(SelectorPart::Universal);
            }
            '+' | '~' => return None,
            _ => {
                current.push(ch);
                chars.next();
            }
        }
    }

    flush_tag(&mut current, &mut parts);

    let is_combinator = |p: Option<&SelectorPart>| {
        matches!(p, Some(SelectorPart::Child) | Some(SelectorPart::Descendant))
    };
    let dangling = is_combinator(parts.first()) || is_combinator(parts.last());
    if parts.is_empty() || dangling {
        None
    } else {
        Some(Selector { parts })
    }
}

fn flush_tag(current: &mut String, parts: &mut Vec<SelectorPart>) {
    let tag = current.trim().to_string();
    if !tag.is_empty() {
        parts.push(SelectorPart::Tag(tag.to_lowercase()));
    }
    current.clear();
}

fn read_ident(chars: &mut std::iter::Peekable<std::str::Chars>) -> String {
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_alphanumeric() || c == '-' || c == '_' {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    name
}

fn skip_whitespace(chars: &mut std::iter::Peekable<std::str::Chars>) {
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else {
            break;
        }
    }
}

/// Split a selector into compounds, remembering each one's left combinator.
fn compile(selector: &Selector) -> Vec<Compound<'_>> {
    let mut compounds = Vec::new();
    let mut current = Compound {
        parts: Vec::new(),
        combinator: None,
    };
    for part in &selector.parts {
        match part {
            SelectorPart::Descendant | SelectorPart::Child => {
                let combinator = if *part == SelectorPart::Child {
                    Combinator::Child
                } else {
                    Combinator::Descendant
                };
                let done = std::mem::replace(
                    &mut current,
                    Compound {
                        parts: Vec::new(),
                        combinator: Some(combinator),
                    },
                );
                if !done.parts.is_empty() {
                    compounds.push(done);
                }
            }
            _ => current.parts.push(part),
        }
    }
    if !current.parts.is_empty() {
        compounds.push(current);
    }
    compounds
}

/// Match compound `ci` against `chain[pos]`, then its left neighbours
/// against the ancestors, backtracking over descendant combinators.
fn match_at(compounds: &[Compound], ci: usize, chain: &[Context], pos: usize) -> bool {
    if !compound_matches(&compounds[ci].parts, &chain[pos]) {
        return false;
    }
    if ci == 0 {
        return true;
    }
    match compounds[ci].combinator {
        Some(Combinator::Child) => pos > 0 && match_at(compounds, ci - 1, chain, pos - 1),
        _ => (0..pos).rev().any(|a| match_at(compounds, ci - 1, chain, a)),
    }
}

fn compound_matches(parts: &[&SelectorPart], ctx: &Context) -> bool {
    let node = ctx.node;
    if !node.is_element() {
        return false;
    }
    parts.iter().all(|part| match part {
        SelectorPart::Tag(t) => node.tag.eq_ignore_ascii_case(t),
        SelectorPart::Class(c) => node.has_class(c),
        SelectorPart::Id(i) => node.get_attr("id") == Some(i.as_str()),
        SelectorPart::Attribute(name, expected) => match expected {
            Some(val) => node.get_attr(name) == Some(val.as_str()),
            None => node.get_attr(name).is_some(),
        },
        SelectorPart::Universal => true,
        SelectorPart::NthChild(n) => ctx.position == *n,
        SelectorPart::FirstChild => ctx.position == 1,
        SelectorPart::LastChild => ctx.position == ctx.siblings,
        SelectorPart::Descendant | SelectorPart::Child => true,
    })
}
