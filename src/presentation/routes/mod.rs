pub mod navigator;
pub mod table;

pub use navigator::{Location, NavigationError, Navigator};
pub use table::{ROUTES, RouteMatch, RouteTable, RouteTarget, View};
