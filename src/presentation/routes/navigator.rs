use std::collections::BTreeMap;

use thiserror::Error;

use super::table::{RouteTable, View};

pub const MAX_REDIRECTS: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NavigationError {
    #[error("no route matches {0}")]
    NotFound(String),
    #[error("too many redirects starting at {0}")]
    RedirectLoop(String),
}

/// Where the app currently is, after redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub view: View,
    pub props: Option<BTreeMap<String, String>>,
}

/// Single-valued "current route" state with a history stack. Each `push`
/// replaces the current location, so the latest navigation wins.
pub struct Navigator<'t> {
    table: &'t RouteTable,
    history: Vec<Location>,
}

impl<'t> Navigator<'t> {
    pub fn new(table: &'t RouteTable) -> Self {
        Self {
            table,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> Option<&Location> {
        self.history.last()
    }

    /// Resolves `path`, following redirects. On failure the current location
    /// is left as it was.
    pub fn push(&mut self, path: &str) -> Result<&Location, NavigationError> {
        let location = self.settle(path)?;
        self.history.push(location);
        Ok(&self.history[self.history.len() - 1])
    }

    /// Returns to the previous location; the first entry is never popped.
    pub fn back(&mut self) -> Option<&Location> {
        if self.history.len() > 1 {
            self.history.pop();
        }
        self.history.last()
    }

    fn settle(&self, path: &str) -> Result<Location, NavigationError> {
        let mut target = path.to_string();
        for _ in 0..=MAX_REDIRECTS {
            let matched = self
                .table
                .resolve(&target)
                .ok_or_else(|| NavigationError::NotFound(target.clone()))?;
            if let Some(next) = matched.redirect() {
                target = next.to_string();
                continue;
            }
            if let Some(view) = matched.view() {
                return Ok(Location {
                    path: target.clone(),
                    view,
                    props: matched.props().cloned(),
                });
            }
        }
        Err(NavigationError::RedirectLoop(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::routes::table::{ROUTES, RouteTarget};

    #[test]
    fn root_lands_on_board_list() {
        let mut nav = Navigator::new(&ROUTES);
        let loc = nav.push("/").unwrap();
        assert_eq!(loc.path, "/boards");
        assert_eq!(loc.view, View::BoardList);
        assert_eq!(loc.props, None);
    }

    #[test]
    fn latest_navigation_wins_and_back_restores() {
        let mut nav = Navigator::new(&ROUTES);
        nav.push("/boards").unwrap();
        nav.push("/board/abc123").unwrap();
        let current = nav.current().unwrap();
        assert_eq!(current.view, View::Board);
        assert_eq!(current.props.as_ref().unwrap()["id"], "abc123");

        assert_eq!(nav.back().unwrap().view, View::BoardList);
        assert_eq!(nav.back().unwrap().view, View::BoardList);
    }

    #[test]
    fn unknown_path_keeps_current_location() {
        let mut nav = Navigator::new(&ROUTES);
        nav.push("/boards").unwrap();
        assert_eq!(
            nav.push("/does-not-exist"),
            Err(NavigationError::NotFound("/does-not-exist".into()))
        );
        assert_eq!(nav.current().unwrap().path, "/boards");
    }

    #[test]
    fn redirect_cycles_are_cut_off() {
        let table = RouteTable::new([
            ("/a", RouteTarget::Redirect("/b"), false),
            ("/b", RouteTarget::Redirect("/a"), false),
        ]);
        let mut nav = Navigator::new(&table);
        assert_eq!(
            nav.push("/a"),
            Err(NavigationError::RedirectLoop("/a".into()))
        );
        assert!(nav.current().is_none());
    }
}
