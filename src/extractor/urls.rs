//! URL configuration extraction.
//!
//! Two extractors read URL configuration: [`UrlPatternExtractor`] handles `path()`,
//! `re_path()` and `url()` entries of `urlpatterns`, [`RouterExtractor`] handles
//! `router.register(...)` calls and the prefix under which `router.urls` is included.

use crate::parser::expr::{last_segment, parse_value, split_top_level, Call, PyValue};
use crate::parser::ParsedFile;
use log::debug;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Trait for extracting routes from parsed URL configuration files.
pub trait RouteExtractor {
    /// Extracts every route declared in the given files, in source order.
    fn extract_routes(&self, parsed_files: &[ParsedFile]) -> Vec<Route>;
}

/// A URL route pointing at a view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    /// Normalized path with `{param}` placeholders
    pub path: String,
    pub target: RouteTarget,
    pub source_file: PathBuf,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteTarget {
    /// `View.as_view(...)` or a function view. `mapping` holds the verb to action pairs of
    /// `ViewSet.as_view({'get': 'list'})`, verbs as written.
    View {
        name: String,
        mapping: Vec<(String, String)>,
    },
    /// A viewset registered on a router under the route's path
    Router { name: String },
}

impl Route {
    pub fn view_name(&self) -> &str {
        match &self.target {
            RouteTarget::View { name, .. } | RouteTarget::Router { name } => name,
        }
    }
}

/// Extracts `urlpatterns` entries.
pub struct UrlPatternExtractor;

/// Extracts router registrations.
pub struct RouterExtractor;

const PATTERN_FUNCTIONS: [&str; 3] = ["path", "re_path", "url"];

fn named_group_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(\?P<(\w+)>[^)]*\)").expect("valid named group regex"))
}

fn converter_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<(?:\w+:)?(\w+)>").expect("valid converter regex"))
}

/// Entries of every `urlpatterns` assignment in a file, with the assignment line.
fn urlpattern_entries(file: &ParsedFile) -> Vec<(usize, PyValue)> {
    let mut entries = Vec::new();

    for assignment in file.assignments.iter().filter(|a| a.target == "urlpatterns") {
        for part in split_top_level(&assignment.value_text, '+') {
            match parse_value(part) {
                PyValue::List(items) | PyValue::Tuple(items) => {
                    entries.extend(items.into_iter().map(|item| (assignment.line, item)));
                }
                other => entries.push((assignment.line, other)),
            }
        }
    }

    entries
}

/// A `path(...)`-style call, split into its route string and view argument.
fn pattern_call(entry: &PyValue) -> Option<(&Call, &str, &PyValue)> {
    let call = entry.as_call()?;
    if !PATTERN_FUNCTIONS.contains(&call.short_name()) {
        return None;
    }
    let route = call
        .args
        .first()
        .or_else(|| call.kwarg("route"))
        .and_then(PyValue::as_str)?;
    let view = call.args.get(1).or_else(|| call.kwarg("view"))?;
    Some((call, route, view))
}

impl RouteExtractor for UrlPatternExtractor {
    fn extract_routes(&self, parsed_files: &[ParsedFile]) -> Vec<Route> {
        let mut routes = Vec::new();

        for file in parsed_files {
            for (line, entry) in urlpattern_entries(file) {
                let Some((call, route, view)) = pattern_call(&entry) else {
                    continue;
                };
                let Some(target) = view_target(view) else {
                    debug!("Skipping URL pattern '{}' with unsupported view {}", route, view);
                    continue;
                };

                routes.push(Route {
                    path: normalize_route(route, call.short_name() != "path"),
                    target,
                    source_file: file.path.clone(),
                    line,
                });
            }
        }

        debug!("Found {} URL patterns", routes.len());
        routes
    }
}

fn view_target(view: &PyValue) -> Option<RouteTarget> {
    match view {
        PyValue::Name(name) => Some(RouteTarget::View {
            name: last_segment(name).to_string(),
            mapping: Vec::new(),
        }),
        PyValue::Call(call) if call.callee.ends_with(".as_view") => {
            let class = call.callee.trim_end_matches(".as_view");
            let mapping = match call.args.first().or_else(|| call.kwarg("actions")) {
                Some(PyValue::Dict(entries)) => entries
                    .iter()
                    .filter_map(|(verb, action)| {
                        Some((verb.as_str()?.to_string(), action.as_str()?.to_string()))
                    })
                    .collect(),
                _ => Vec::new(),
            };
            Some(RouteTarget::View {
                name: last_segment(class).to_string(),
                mapping,
            })
        }
        _ => None,
    }
}

impl RouteExtractor for RouterExtractor {
    fn extract_routes(&self, parsed_files: &[ParsedFile]) -> Vec<Route> {
        let mut routes = Vec::new();

        for file in parsed_files {
            let prefixes = router_prefixes(file);
            if prefixes.is_empty() {
                continue;
            }

            for expression in &file.expressions {
                let value = parse_value(&expression.text);
                let Some(call) = value.as_call() else {
                    continue;
                };
                let Some(router) = call.callee.strip_suffix(".register") else {
                    continue;
                };
                let Some(router_prefix) = prefixes.get(router) else {
                    continue;
                };

                let prefix = call
                    .args
                    .first()
                    .or_else(|| call.kwarg("prefix"))
                    .and_then(PyValue::as_str);
                let viewset = call
                    .args
                    .get(1)
                    .or_else(|| call.kwarg("viewset"))
                    .and_then(PyValue::as_name);
                let (Some(prefix), Some(viewset)) = (prefix, viewset) else {
                    debug!("Skipping unreadable router registration: {}", expression.text);
                    continue;
                };

                routes.push(Route {
                    path: join_routes(router_prefix, &normalize_route(prefix, true)),
                    target: RouteTarget::Router {
                        name: last_segment(viewset).to_string(),
                    },
                    source_file: file.path.clone(),
                    line: expression.line,
                });
            }
        }

        debug!("Found {} router registrations", routes.len());
        routes
    }
}

/// Routers created in a file, mapped to the prefix their `urls` are included under.
///
/// A router whose URLs are never included keeps an empty prefix.
fn router_prefixes(file: &ParsedFile) -> BTreeMap<String, String> {
    let mut prefixes: BTreeMap<String, String> = file
        .assignments
        .iter()
        .filter(|a| {
            a.value
                .as_call()
                .map_or(false, |call| call.short_name().ends_with("Router"))
        })
        .map(|a| (a.target.clone(), String::new()))
        .collect();

    for (_, entry) in urlpattern_entries(file) {
        let Some((call, route, view)) = pattern_call(&entry) else {
            continue;
        };
        let Some(include) = view.as_call().filter(|c| c.short_name() == "include") else {
            continue;
        };
        let Some(router) = include
            .args
            .first()
            .and_then(PyValue::as_name)
            .and_then(|name| name.strip_suffix(".urls"))
        else {
            continue;
        };
        if let Some(prefix) = prefixes.get_mut(router) {
            *prefix = normalize_route(route, call.short_name() != "path");
        }
    }

    prefixes
}

/// Converts a Django route or regex into a `/`-delimited path with `{param}` placeholders.
///
/// `<int:pk>` and `(?P<pk>[0-9]+)` both become `{pk}`. The result always starts and ends
/// with `/`.
pub fn normalize_route(route: &str, regex: bool) -> String {
    let mut path = route.trim().to_string();

    if regex {
        path = path.trim_start_matches('^').trim_end_matches('$').to_string();
        path = named_group_regex().replace_all(&path, "{$1}").to_string();
        path = path.replace("\\.", ".").replace("\\-", "-").replace("\\/", "/");
    }
    path = converter_regex().replace_all(&path, "{$1}").to_string();

    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    if !path.ends_with('/') {
        path.push('/');
    }
    path
}

/// Joins two normalized paths.
pub fn join_routes(prefix: &str, route: &str) -> String {
    if prefix.is_empty() || prefix == "/" {
        return route.to_string();
    }
    format!("{}{}", prefix.trim_end_matches('/'), route)
}
