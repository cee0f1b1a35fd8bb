use std::collections::BTreeMap;

use once_cell::sync::Lazy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    BoardList,
    Board,
}

impl View {
    pub fn name(&self) -> &'static str {
        match self {
            View::BoardList => "board-list",
            View::Board => "board",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    Redirect(&'static str),
    View(View),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Literal(&'static str),
    Param(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub pattern: &'static str,
    pub target: RouteTarget,
    /// Whether bound path params are handed to the view.
    pub props: bool,
    segments: Vec<Segment>,
}

impl RouteEntry {
    fn new(pattern: &'static str, target: RouteTarget, props: bool) -> Self {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Param(name),
                None => Segment::Literal(s),
            })
            .collect();
        Self {
            pattern,
            target,
            props,
            segments,
        }
    }

    fn bind(&self, parts: &[&str]) -> Option<BTreeMap<String, String>> {
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = BTreeMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    let value = urlencoding::decode(part)
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| part.to_string());
                    params.insert(name.to_string(), value);
                }
            }
        }
        Some(params)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch<'a> {
    pub entry: &'a RouteEntry,
    pub params: BTreeMap<String, String>,
}

impl RouteMatch<'_> {
    pub fn redirect(&self) -> Option<&'static str> {
        match self.entry.target {
            RouteTarget::Redirect(to) => Some(to),
            RouteTarget::View(_) => None,
        }
    }

    pub fn view(&self) -> Option<View> {
        match self.entry.target {
            RouteTarget::View(view) => Some(view),
            RouteTarget::Redirect(_) => None,
        }
    }

    /// Params forwarded to the view, or `None` when the entry takes no props.
    pub fn props(&self) -> Option<&BTreeMap<String, String>> {
        self.entry.props.then_some(&self.params)
    }
}

/// Ordered path patterns; the first entry that matches wins.
#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new(entries: impl IntoIterator<Item = (&'static str, RouteTarget, bool)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(pattern, target, props)| RouteEntry::new(pattern, target, props))
                .collect(),
        }
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Matches a request path. The query string, fragment and a trailing
    /// slash are ignored.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch<'_>> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.entries.iter().find_map(|entry| {
            entry
                .bind(&parts)
                .map(|params| RouteMatch { entry, params })
        })
    }
}

pub static ROUTES: Lazy<RouteTable> = Lazy::new(|| {
    RouteTable::new([
        ("/", RouteTarget::Redirect("/boards"), false),
        ("/boards", RouteTarget::View(View::BoardList), false),
        ("/board/:id", RouteTarget::View(View::Board), true),
    ])
});
