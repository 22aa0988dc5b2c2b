use super::{ClassDescriptor, StructureExtractor};
use crate::parser::expr::last_segment;
use crate::parser::ParsedFile;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

pub(crate) const SERIALIZER_BASES: &[&str] = &[
    "BaseSerializer",
    "Serializer",
    "ModelSerializer",
    "HyperlinkedModelSerializer",
    "ListSerializer",
];

pub(crate) const VIEW_BASES: &[&str] = &[
    "View",
    "APIView",
    "GenericAPIView",
    "CreateAPIView",
    "ListAPIView",
    "RetrieveAPIView",
    "UpdateAPIView",
    "DestroyAPIView",
    "ListCreateAPIView",
    "RetrieveUpdateAPIView",
    "RetrieveDestroyAPIView",
    "RetrieveUpdateDestroyAPIView",
    "ViewSetMixin",
    "ViewSet",
    "GenericViewSet",
    "ModelViewSet",
    "ReadOnlyModelViewSet",
];

pub(crate) const MODEL_BASES: &[&str] = &["Model", "AbstractUser", "AbstractBaseUser"];

/// The three class families the extractor distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassRole {
    Serializer,
    View,
    Model,
}

const ROLES: [ClassRole; 3] = [ClassRole::Model, ClassRole::Serializer, ClassRole::View];

pub(crate) fn extract_classes(files: &[ParsedFile]) -> Vec<ClassDescriptor> {
    let mut classes = Vec::new();

    for file in files {
        let constants: BTreeMap<_, _> = file
            .assignments
            .iter()
            .filter(|a| !a.augmented)
            .map(|a| (a.target.clone(), a.value.clone()))
            .collect();

        for block in &file.classes {
            classes.push(ClassDescriptor {
                name: block.name.clone(),
                source_file: file.path.clone(),
                line: block.line,
                base_types: block.bases.clone(),
                docstring: block.docstring.clone(),
                block: block.clone(),
                module_constants: constants.clone(),
            });
        }
    }

    debug!("Extracted {} classes from {} files", classes.len(), files.len());
    classes
}

impl StructureExtractor {
    /// Records the role of classes that derive from other classes of the same application.
    ///
    /// Resolution repeats until no new class is learned, so chains of local bases of any
    /// depth are followed regardless of declaration order.
    pub fn register_local_classes(&mut self, classes: &[ClassDescriptor]) {
        loop {
            let mut learned = false;
            for class in classes {
                if self.local_roots.contains_key(&class.name) {
                    continue;
                }
                for role in ROLES {
                    if let Some(root) = self.root_base(class, role) {
                        debug!("{} is {:?}-like via {}", class.name, role, root);
                        self.local_roots.insert(class.name.clone(), (role, root));
                        learned = true;
                        break;
                    }
                }
            }
            if !learned {
                break;
            }
        }
    }

    /// The framework base a class derives from in `role`, if any.
    ///
    /// Bases are compared by their last dotted segment, so `serializers.ModelSerializer` and
    /// `ModelSerializer` are the same. Bases are tried in declaration order.
    pub fn root_base(&self, class: &ClassDescriptor, role: ClassRole) -> Option<String> {
        let table = match role {
            ClassRole::Serializer => &self.serializer_bases,
            ClassRole::View => &self.view_bases,
            ClassRole::Model => &self.model_bases,
        };

        class.base_types.iter().find_map(|base| {
            let name = last_segment(generic_base(base));
            if table.contains(name) {
                return Some(name.to_string());
            }
            match self.local_roots.get(name) {
                Some((local_role, root)) if *local_role == role && name != class.name => {
                    Some(root.clone())
                }
                _ => None,
            }
        })
    }
}

/// Strips a subscript from a base expression: `Generic[T]` gives `Generic`.
fn generic_base(base: &str) -> &str {
    base.split('[').next().unwrap_or(base).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::parser::SourceParser;
    use std::path::Path;

    fn classes(source: &str) -> Vec<ClassDescriptor> {
        let parsed = SourceParser::parse_source(Path::new("shop/views.py"), source);
        extract_classes(&[parsed])
    }

    #[test]
    fn test_extract_classes_in_declaration_order() {
        let found = classes(
            r#"
LIMIT = 10

class A(serializers.Serializer):
    """First."""

class B(A, SomeMixin):
    pass
"#,
        );

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "A");
        assert_eq!(found[0].docstring.as_deref(), Some("First."));
        assert_eq!(found[1].base_types, vec!["A", "SomeMixin"]);
        assert!(found[1].module_constants.contains_key("LIMIT"));
    }

    #[test]
    fn test_classification_by_last_segment() {
        let extractor = StructureExtractor::new(&ExtractionConfig::default());
        let found = classes(
            r#"
class UserSerializer(serializers.ModelSerializer):
    pass

class UserViewSet(viewsets.ModelViewSet):
    pass

class User(models.Model):
    pass

class Helper(object):
    pass
"#,
        );

        assert!(extractor.is_serializer_like(&found[0]));
        assert!(!extractor.is_view_like(&found[0]));
        assert!(extractor.is_view_like(&found[1]));
        assert!(extractor.is_model_like(&found[2]));
        assert!(!extractor.is_serializer_like(&found[3]));
        assert!(!extractor.is_view_like(&found[3]));
        assert!(!extractor.is_model_like(&found[3]));
    }

    #[test]
    fn test_configured_bases_extend_tables() {
        let config = ExtractionConfig {
            serializer_bases: vec!["DynamicFieldsSerializer".to_string()],
            ..ExtractionConfig::default()
        };
        let extractor = StructureExtractor::new(&config);
        let found = classes("class A(lib.DynamicFieldsSerializer):\n    pass\n");

        assert!(extractor.is_serializer_like(&found[0]));
    }

    #[test]
    fn test_local_bases_are_followed() {
        let mut extractor = StructureExtractor::new(&ExtractionConfig::default());
        let found = classes(
            r#"
class OrderViewSet(BaseViewSet):
    pass

class BaseViewSet(AuditedViewSet):
    pass

class AuditedViewSet(viewsets.GenericViewSet):
    pass
"#,
        );

        assert!(!extractor.is_view_like(&found[0]));
        extractor.register_local_classes(&found);

        assert!(extractor.is_view_like(&found[0]));
        assert_eq!(
            extractor.root_base(&found[0], ClassRole::View).as_deref(),
            Some("GenericViewSet")
        );
    }
}
