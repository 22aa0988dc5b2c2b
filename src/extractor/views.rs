//! View extraction and endpoint binding.

use super::urls::{Route, RouteExtractor, RouteTarget, RouterExtractor, UrlPatternExtractor};
use super::{
    ClassDescriptor, ClassRole, EndpointDescriptor, Extracted, HandlerBinding, HttpMethod,
    StructureExtractor, ViewAction, ViewDescriptor, ViewKind,
};
use crate::error::Error;
use crate::naming::kebab_case;
use crate::parser::expr::{last_segment, parse_value, PyValue};
use crate::parser::{FunctionBlock, ParsedFile, Suite};
use log::debug;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

/// Standard viewset actions: name, verb and whether the action addresses a single object.
const STANDARD_ACTIONS: [(&str, HttpMethod, bool); 6] = [
    ("list", HttpMethod::Get, false),
    ("create", HttpMethod::Post, false),
    ("retrieve", HttpMethod::Get, true),
    ("update", HttpMethod::Put, true),
    ("partial_update", HttpMethod::Patch, true),
    ("destroy", HttpMethod::Delete, true),
];

const MIXIN_ACTIONS: [(&str, &[&str]); 5] = [
    ("ListModelMixin", &["list"]),
    ("CreateModelMixin", &["create"]),
    ("RetrieveModelMixin", &["retrieve"]),
    ("UpdateModelMixin", &["update", "partial_update"]),
    ("DestroyModelMixin", &["destroy"]),
];

/// Handler names Django dispatches to that have no endpoint representation.
const UNSUPPORTED_HANDLERS: [&str; 3] = ["head", "options", "trace"];

const VIEW_SUFFIXES: [&str; 3] = ["ViewSet", "APIView", "View"];

fn queryset_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[A-Za-z_]\w*\.)*([A-Za-z_]\w*)\.objects\b").expect("valid queryset regex")
    })
}

/// Verb table of the concrete generic views.
fn generic_handlers(root: &str) -> Option<&'static [(HttpMethod, &'static str)]> {
    use HttpMethod::*;
    let table: &'static [(HttpMethod, &'static str)] = match root {
        "CreateAPIView" => &[(Post, "create")],
        "ListAPIView" => &[(Get, "list")],
        "RetrieveAPIView" => &[(Get, "retrieve")],
        "UpdateAPIView" => &[(Put, "update"), (Patch, "partial_update")],
        "DestroyAPIView" => &[(Delete, "destroy")],
        "ListCreateAPIView" => &[(Get, "list"), (Post, "create")],
        "RetrieveUpdateAPIView" => &[(Get, "retrieve"), (Put, "update"), (Patch, "partial_update")],
        "RetrieveDestroyAPIView" => &[(Get, "retrieve"), (Delete, "destroy")],
        "RetrieveUpdateDestroyAPIView" => &[
            (Get, "retrieve"),
            (Put, "update"),
            (Patch, "partial_update"),
            (Delete, "destroy"),
        ],
        _ => return None,
    };
    Some(table)
}

fn view_kind(root: &str) -> ViewKind {
    match root {
        "ViewSetMixin" | "ViewSet" | "GenericViewSet" | "ModelViewSet" | "ReadOnlyModelViewSet" => {
            ViewKind::ViewSet
        }
        _ if generic_handlers(root).is_some() => ViewKind::Generic,
        _ => ViewKind::Handler,
    }
}

fn inherited_actions(root: &str) -> &'static [&'static str] {
    match root {
        "ModelViewSet" => &["list", "create", "retrieve", "update", "partial_update", "destroy"],
        "ReadOnlyModelViewSet" => &["list", "retrieve"],
        _ => &[],
    }
}

fn extraction_warning(file: &Path, message: String) -> String {
    Error::Extraction {
        file: file.to_path_buf(),
        message,
    }
    .to_string()
}

/// First paragraph of a docstring.
fn summary(docstring: &Option<String>) -> Option<String> {
    docstring
        .as_deref()
        .and_then(|doc| doc.split("\n\n").next())
        .map(|paragraph| paragraph.lines().map(str::trim).collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
}

/// Heuristic endpoint description for a verb and action.
pub fn describe(method: HttpMethod, action: &str, subject: &str) -> String {
    match (method, action) {
        (HttpMethod::Get, "list") => format!("List all {} instances", subject),
        (HttpMethod::Post, "create") => format!("Create a new {} instance", subject),
        (HttpMethod::Get, "retrieve") => format!("Retrieve a specific {} instance", subject),
        (HttpMethod::Put, "update") => format!("Update a specific {} instance", subject),
        (HttpMethod::Patch, "partial_update") => {
            format!("Partially update a specific {} instance", subject)
        }
        (HttpMethod::Delete, "destroy") => format!("Delete a specific {} instance", subject),
        _ => format!("{} {}", method, subject),
    }
}

fn class_names(value: Option<&PyValue>) -> Vec<String> {
    value
        .and_then(PyValue::as_seq)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_name().map(|n| last_segment(n).to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn queryset_model(suite: &Suite) -> Option<String> {
    let from_queryset = suite
        .assignments
        .iter()
        .rev()
        .find(|a| a.target == "queryset")
        .and_then(|a| queryset_regex().captures(&a.value_text))
        .map(|caps| caps[1].to_string());

    from_queryset.or_else(|| {
        suite
            .value_of("model")
            .and_then(PyValue::as_name)
            .map(|name| last_segment(name).to_string())
    })
}

pub(crate) fn extract_views(
    extractor: &StructureExtractor,
    files: &[ParsedFile],
) -> Extracted<ViewDescriptor> {
    let mut result = Extracted::default();

    for file in files {
        let mut file_views = Vec::new();

        for class in super::classes::extract_classes(std::slice::from_ref(file)) {
            if let Some(root) = extractor.root_base(&class, ClassRole::View) {
                file_views.push(class_view(&class, &root, &mut result.warnings));
            }
        }
        for function in &file.functions {
            if let Some(view) = function_view(file, function, &mut result.warnings) {
                file_views.push(view);
            }
        }

        file_views.sort_by_key(|view| view.line);
        result.items.extend(file_views);
    }

    debug!("Extracted {} views", result.items.len());
    result
}

fn class_view(class: &ClassDescriptor, root: &str, warnings: &mut Vec<String>) -> ViewDescriptor {
    let suite = class.block.suite();
    let kind = view_kind(root);

    for function in &suite.functions {
        if UNSUPPORTED_HANDLERS.contains(&function.name.as_str()) {
            warnings.push(extraction_warning(
                &class.source_file,
                format!(
                    "unsupported HTTP method '{}' on {}",
                    function.name.to_ascii_uppercase(),
                    class.name
                ),
            ));
        }
    }

    let mut view = ViewDescriptor {
        name: class.name.clone(),
        source_file: class.source_file.clone(),
        line: class.line,
        kind,
        handler_class: class.name.clone(),
        docstring: class.docstring.clone(),
        serializer_class: suite
            .value_of("serializer_class")
            .and_then(PyValue::as_name)
            .map(|name| last_segment(name).to_string()),
        model: queryset_model(&suite),
        permission_classes: class_names(suite.value_of("permission_classes")),
        lookup_field: suite
            .value_of("lookup_field")
            .and_then(PyValue::as_str)
            .unwrap_or("pk")
            .to_string(),
        handlers: Vec::new(),
        actions: Vec::new(),
    };

    match kind {
        ViewKind::Handler => view.handlers = defined_handlers(&suite, &[]),
        ViewKind::Generic => {
            let table = generic_handlers(root).unwrap_or(&[]);
            for (method, action) in table {
                let docstring = suite
                    .function(action)
                    .or_else(|| suite.function(method.handler_name()))
                    .and_then(|f| f.docstring.clone());
                view.handlers.push(HandlerBinding {
                    method: *method,
                    function: action.to_string(),
                    docstring,
                });
            }
            let covered: Vec<HttpMethod> = table.iter().map(|(m, _)| *m).collect();
            view.handlers.extend(defined_handlers(&suite, &covered));
        }
        ViewKind::ViewSet => view.actions = viewset_actions(class, root, &suite, warnings),
        ViewKind::Function => {}
    }

    view
}

/// Bindings for the verb handler methods a class defines, skipping verbs in `covered`.
fn defined_handlers(suite: &Suite, covered: &[HttpMethod]) -> Vec<HandlerBinding> {
    HttpMethod::ALL
        .iter()
        .filter(|method| !covered.contains(method))
        .filter_map(|method| {
            suite.function(method.handler_name()).map(|f| HandlerBinding {
                method: *method,
                function: f.name.clone(),
                docstring: f.docstring.clone(),
            })
        })
        .collect()
}

fn viewset_actions(
    class: &ClassDescriptor,
    root: &str,
    suite: &Suite,
    warnings: &mut Vec<String>,
) -> Vec<ViewAction> {
    let mut available: BTreeSet<&str> = inherited_actions(root).iter().copied().collect();
    for base in &class.base_types {
        if let Some((_, actions)) = MIXIN_ACTIONS
            .iter()
            .find(|(mixin, _)| *mixin == last_segment(base))
        {
            available.extend(actions.iter().copied());
        }
    }
    for function in &suite.functions {
        available.insert(function.name.as_str());
    }

    let mut actions: Vec<ViewAction> = STANDARD_ACTIONS
        .iter()
        .filter(|(name, _, _)| available.contains(name))
        .map(|(name, method, detail)| ViewAction {
            name: name.to_string(),
            methods: vec![*method],
            detail: *detail,
            url_path: None,
            docstring: suite.function(name).and_then(|f| f.docstring.clone()),
            custom: false,
        })
        .collect();

    for function in &suite.functions {
        if let Some(action) = custom_action(class, function, warnings) {
            actions.push(action);
        }
    }

    actions
}

/// Reads an `@action(...)` decorated method.
fn custom_action(
    class: &ClassDescriptor,
    function: &FunctionBlock,
    warnings: &mut Vec<String>,
) -> Option<ViewAction> {
    let decorator = function
        .decorators
        .iter()
        .map(|d| parse_value(d))
        .find(|d| match d {
            PyValue::Call(call) => call.short_name() == "action",
            PyValue::Name(name) => last_segment(name) == "action",
            _ => false,
        })?;
    let call = decorator.as_call();

    let verbs = call
        .and_then(|c| c.kwarg("methods"))
        .map(PyValue::string_items)
        .unwrap_or_else(|| vec!["get".to_string()]);
    let methods = parse_verbs(&verbs, &class.source_file, &function.name, warnings);

    Some(ViewAction {
        name: function.name.clone(),
        methods,
        detail: !call.map_or(false, |c| c.flag_false("detail")),
        url_path: Some(
            call.and_then(|c| c.kwarg("url_path"))
                .and_then(PyValue::as_str)
                .unwrap_or(function.name.as_str())
                .to_string(),
        ),
        docstring: function.docstring.clone(),
        custom: true,
    })
}

fn parse_verbs(
    verbs: &[String],
    file: &Path,
    owner: &str,
    warnings: &mut Vec<String>,
) -> Vec<HttpMethod> {
    let mut methods = Vec::new();
    for verb in verbs {
        match HttpMethod::parse(verb) {
            Some(method) if !methods.contains(&method) => methods.push(method),
            Some(_) => {}
            None => warnings.push(extraction_warning(
                file,
                format!(
                    "unsupported HTTP method '{}' on {}",
                    verb.to_ascii_uppercase(),
                    owner
                ),
            )),
        }
    }
    methods
}

/// Reads an `@api_view([...])` function.
fn function_view(
    file: &ParsedFile,
    function: &FunctionBlock,
    warnings: &mut Vec<String>,
) -> Option<ViewDescriptor> {
    let decorators: Vec<PyValue> = function.decorators.iter().map(|d| parse_value(d)).collect();
    let api_view = decorators.iter().find(|d| match d {
        PyValue::Call(call) => call.short_name() == "api_view",
        PyValue::Name(name) => last_segment(name) == "api_view",
        _ => false,
    })?;

    let verbs = api_view
        .as_call()
        .and_then(|c| c.args.first().or_else(|| c.kwarg("http_method_names")))
        .map(PyValue::string_items)
        .unwrap_or_else(|| vec!["GET".to_string()]);
    let methods = parse_verbs(&verbs, &file.path, &function.name, warnings);

    let permission_classes = decorators
        .iter()
        .filter_map(PyValue::as_call)
        .find(|c| c.short_name() == "permission_classes")
        .map(|c| class_names(c.args.first()))
        .unwrap_or_default();

    Some(ViewDescriptor {
        name: function.name.clone(),
        source_file: file.path.clone(),
        line: function.line,
        kind: ViewKind::Function,
        handler_class: file.module_name(),
        docstring: function.docstring.clone(),
        serializer_class: None,
        model: None,
        permission_classes,
        lookup_field: "pk".to_string(),
        handlers: methods
            .into_iter()
            .map(|method| HandlerBinding {
                method,
                function: function.name.clone(),
                docstring: function.docstring.clone(),
            })
            .collect(),
        actions: Vec::new(),
    })
}

/// Collects the endpoints of every view, in view order and then route order.
pub(crate) fn bind_endpoints(
    views: &[ViewDescriptor],
    files: &[ParsedFile],
) -> Extracted<EndpointDescriptor> {
    let mut routes = UrlPatternExtractor.extract_routes(files);
    routes.extend(RouterExtractor.extract_routes(files));
    let file_index = |route: &Route| {
        files
            .iter()
            .position(|f| f.path == route.source_file)
            .unwrap_or(usize::MAX)
    };
    routes.sort_by_key(|route| (file_index(route), route.line));

    let mut builder = EndpointBuilder::default();

    for view in views {
        let bound: Vec<&Route> = routes.iter().filter(|r| r.view_name() == view.name).collect();
        if bound.is_empty() {
            builder.heuristic(view);
        }
        for route in bound {
            builder.route(view, route);
        }
    }

    for route in &routes {
        if !views.iter().any(|v| v.name == route.view_name()) {
            debug!(
                "No view found for route {} -> {}, skipping",
                route.path,
                route.view_name()
            );
        }
    }

    builder.result
}

#[derive(Default)]
struct EndpointBuilder {
    result: Extracted<EndpointDescriptor>,
    seen: BTreeSet<(String, HttpMethod)>,
}

impl EndpointBuilder {
    fn push(
        &mut self,
        view: &ViewDescriptor,
        path: String,
        method: HttpMethod,
        function: &str,
        description: String,
    ) {
        if !self.seen.insert((path.clone(), method)) {
            debug!("Duplicate endpoint {} {} skipped", method, path);
            return;
        }
        self.result.items.push(EndpointDescriptor {
            path,
            http_method: method,
            handler_class: view.handler_class.clone(),
            handler_function: function.to_string(),
            description,
            serializer_class: view.serializer_class.clone(),
            permission_classes: view.permission_classes.clone(),
        });
    }

    fn subject(view: &ViewDescriptor) -> &str {
        match (&view.model, view.kind) {
            (Some(model), _) => model.as_str(),
            (None, ViewKind::Function) => view.name.as_str(),
            (None, _) => "resource",
        }
    }

    fn bindings(&mut self, view: &ViewDescriptor, path: &str) {
        for binding in &view.handlers {
            let description = summary(&binding.docstring).unwrap_or_else(|| {
                describe(binding.method, &binding.function, Self::subject(view))
            });
            self.push(view, path.to_string(), binding.method, &binding.function, description);
        }
    }

    fn action(&mut self, view: &ViewDescriptor, action: &ViewAction, collection: &str) {
        let mut path = collection.to_string();
        if action.detail {
            path.push_str(&format!("{{{}}}/", view.lookup_field));
        }
        if let Some(url_path) = &action.url_path {
            path.push_str(url_path.trim_matches('/'));
            path.push('/');
        }

        for method in &action.methods {
            let description = summary(&action.docstring).unwrap_or_else(|| {
                if action.custom {
                    format!("Custom action: {}", action.name)
                } else {
                    describe(*method, &action.name, Self::subject(view))
                }
            });
            self.push(view, path.clone(), *method, &action.name, description);
        }
    }

    /// Endpoints for a view no route refers to, at a path derived from its name.
    fn heuristic(&mut self, view: &ViewDescriptor) {
        let stem = VIEW_SUFFIXES
            .iter()
            .find_map(|suffix| view.name.strip_suffix(suffix).filter(|s| !s.is_empty()))
            .unwrap_or(view.name.as_str());
        let base = format!("/{}/", kebab_case(stem));
        debug!("{} has no route, using {}", view.name, base);

        if view.kind == ViewKind::ViewSet {
            for action in &view.actions {
                self.action(view, action, &base);
            }
        } else {
            self.bindings(view, &base);
        }
    }

    fn route(&mut self, view: &ViewDescriptor, route: &Route) {
        match (&route.target, view.kind) {
            (RouteTarget::Router { .. }, ViewKind::ViewSet) => {
                for action in &view.actions {
                    self.action(view, action, &route.path);
                }
            }
            (RouteTarget::Router { .. }, _) => {
                debug!("{} is registered on a router but is not a viewset", view.name);
            }
            (RouteTarget::View { mapping, .. }, ViewKind::ViewSet) => {
                if mapping.is_empty() {
                    debug!("{} routed with as_view() and no actions, skipping", view.name);
                }
                for (verb, action_name) in mapping {
                    let Some(method) = HttpMethod::parse(verb) else {
                        self.result.warnings.push(extraction_warning(
                            &route.source_file,
                            format!(
                                "unsupported HTTP method '{}' on {}",
                                verb.to_ascii_uppercase(),
                                view.name
                            ),
                        ));
                        continue;
                    };
                    let description = view
                        .actions
                        .iter()
                        .find(|a| &a.name == action_name)
                        .and_then(|a| summary(&a.docstring))
                        .unwrap_or_else(|| describe(method, action_name, Self::subject(view)));
                    self.push(view, route.path.clone(), method, action_name, description);
                }
            }
            (RouteTarget::View { .. }, _) => self.bindings(view, &route.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::parser::SourceParser;
    use pretty_assertions::assert_eq;

    fn parse(name: &str, source: &str) -> ParsedFile {
        SourceParser::parse_source(Path::new(name), source)
    }

    fn endpoints(files: &[ParsedFile]) -> Extracted<EndpointDescriptor> {
        let mut extractor = StructureExtractor::new(&ExtractionConfig::default());
        let classes = extractor.extract_classes(files);
        extractor.register_local_classes(&classes);
        extractor.extract_endpoints(files)
    }

    fn summary_of(found: &Extracted<EndpointDescriptor>) -> Vec<String> {
        found
            .items
            .iter()
            .map(|e| format!("{} {} {}", e.http_method, e.path, e.handler_function))
            .collect()
    }

    #[test]
    fn test_model_viewset_registered_on_router() {
        let views = parse(
            "shop/views.py",
            r#"
class ProductViewSet(viewsets.ModelViewSet):
    queryset = Product.objects.all()
    serializer_class = ProductSerializer
    permission_classes = [permissions.IsAuthenticated]
    lookup_field = 'slug'

    @action(detail=True, methods=['post'])
    def publish(self, request, slug=None):
        """Publish the product."""

    @action(detail=False, url_path='on-sale')
    def on_sale(self, request):
        pass
"#,
        );
        let urls = parse(
            "shop/urls.py",
            "router = DefaultRouter()\nrouter.register(r'products', ProductViewSet)\nurlpatterns = [path('api/', include(router.urls))]\n",
        );

        let found = endpoints(&[views, urls]);

        assert_eq!(
            summary_of(&found),
            vec![
                "GET /api/products/ list",
                "POST /api/products/ create",
                "GET /api/products/{slug}/ retrieve",
                "PUT /api/products/{slug}/ update",
                "PATCH /api/products/{slug}/ partial_update",
                "DELETE /api/products/{slug}/ destroy",
                "POST /api/products/{slug}/publish/ publish",
                "GET /api/products/on-sale/ on_sale",
            ]
        );
        assert_eq!(found.items[0].description, "List all Product instances");
        assert_eq!(found.items[6].description, "Publish the product.");
        assert_eq!(found.items[7].description, "Custom action: on_sale");
        assert_eq!(found.items[0].serializer_class.as_deref(), Some("ProductSerializer"));
        assert_eq!(found.items[0].permission_classes, vec!["IsAuthenticated"]);
        assert!(found.warnings.is_empty());
    }

    #[test]
    fn test_api_view_and_generic_views_on_explicit_routes() {
        let views = parse(
            "users/views.py",
            r#"
class UserListView(generics.ListCreateAPIView):
    queryset = User.objects.filter(active=True)

    def get(self, request):
        """Return the active users."""


class UserDetailView(APIView):
    def get(self, request, pk):
        pass

    def delete(self, request, pk):
        pass

    def options(self, request, pk):
        pass


@api_view(['GET', 'HEAD'])
def health(request):
    """Service health."""
"#,
        );
        let urls = parse(
            "users/urls.py",
            r#"
urlpatterns = [
    path('users/', views.UserListView.as_view()),
    path('users/<int:pk>/', views.UserDetailView.as_view()),
    path('health/', views.health),
    path('missing/', views.MissingView.as_view()),
]
"#,
        );

        let found = endpoints(&[views, urls]);

        assert_eq!(
            summary_of(&found),
            vec![
                "GET /users/ list",
                "POST /users/ create",
                "GET /users/{pk}/ get",
                "DELETE /users/{pk}/ delete",
                "GET /health/ health",
            ]
        );
        assert_eq!(found.items[0].description, "Return the active users.");
        assert_eq!(found.items[1].description, "Create a new User instance");
        assert_eq!(found.items[2].handler_class, "UserDetailView");
        assert_eq!(found.items[4].handler_class, "views");
        assert_eq!(found.items[4].description, "Service health.");

        assert_eq!(found.warnings.len(), 2);
        assert!(found.warnings.iter().any(|w| w.contains("'OPTIONS' on UserDetailView")));
        assert!(found.warnings.iter().any(|w| w.contains("'HEAD' on health")));
    }

    #[test]
    fn test_as_view_mapping_for_viewset() {
        let views = parse(
            "orders/views.py",
            "class OrderViewSet(viewsets.ViewSet):\n    def list(self, request):\n        pass\n",
        );
        let urls = parse(
            "orders/urls.py",
            "urlpatterns = [path('orders/', OrderViewSet.as_view({'get': 'list', 'head': 'list'}))]\n",
        );

        let found = endpoints(&[views, urls]);

        assert_eq!(summary_of(&found), vec!["GET /orders/ list"]);
        assert_eq!(found.items[0].description, "List all resource instances");
        assert_eq!(found.warnings.len(), 1);
    }

    #[test]
    fn test_unrouted_views_get_heuristic_paths() {
        let views = parse(
            "catalog/views.py",
            r#"
class CategoryViewSet(mixins.ListModelMixin, viewsets.GenericViewSet):
    pass


class UserProfileAPIView(APIView):
    def post(self, request):
        pass
"#,
        );

        let found = endpoints(&[views]);

        assert_eq!(
            summary_of(&found),
            vec!["GET /category/ list", "POST /user-profile/ post"]
        );
        assert_eq!(found.items[1].description, "POST resource");
    }

    #[test]
    fn test_read_only_viewset_via_local_base() {
        let views = parse(
            "blog/views.py",
            r#"
class BaseViewSet(viewsets.ReadOnlyModelViewSet):
    queryset = Post.objects.all()


class PostViewSet(BaseViewSet):
    queryset = Post.objects.all()
"#,
        );
        let urls = parse(
            "blog/urls.py",
            "router = SimpleRouter()\nrouter.register('posts', PostViewSet)\nurlpatterns = router.urls\n",
        );

        let found = endpoints(&[views, urls]);
        let post_endpoints: Vec<_> = found
            .items
            .iter()
            .filter(|e| e.handler_class == "PostViewSet")
            .map(|e| format!("{} {}", e.http_method, e.path))
            .collect();

        assert_eq!(post_endpoints, vec!["GET /posts/", "GET /posts/{pk}/"]);
    }

    #[test]
    fn test_describe_fallback() {
        assert_eq!(
            describe(HttpMethod::Delete, "destroy", "Order"),
            "Delete a specific Order instance"
        );
        assert_eq!(describe(HttpMethod::Get, "get", "resource"), "GET resource");
    }
}
