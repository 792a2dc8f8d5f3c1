//! Module-path materialization.
//!
//! The materializer turns a parsed descriptor into an on-disk module-path
//! layout: one directory per module holding a `module.xml` and the artifact
//! files its placeholders resolved to. The synthesized bootstrap module is
//! always processed first, then the declared modules in document order.
//!
//! Filesystem writes are not transactional. A failure partway through leaves
//! a partially populated modules directory; re-running with `clean = true`
//! recovers.

pub mod copy;

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::descriptor::{parse_descriptor_file, ElementNode, Module, ModuleKind, PlaceholderRef};
use crate::index::{
    coordinate, ArtifactRepository, DependencyGraphSource, DependencyIndex, MODULAR_BOOTER_ARTIFACT,
    MODULAR_BOOTER_GROUP, SUREFIRE_API_ARTIFACT, SUREFIRE_API_GROUP,
};

/// Name of the one synthesized module wiring the test-execution entry point.
pub const BOOTSTRAP_MODULE_NAME: &str = "jboss.surefire.module";

/// Entry point class the bootstrap module's `main-class` element names.
pub const BOOTER_MAIN_CLASS: &str = "org.apache.maven.surefire.booter.SurefireBooter";

/// The only module descriptor namespace the materializer can generate for.
pub const SUPPORTED_TARGET_NAMESPACE: &str = "urn:jboss:module:1.0";

/// Placeholder token for the compiled main classes directory.
pub const CLASSES_TOKEN: &str = "CLASSES";

/// Placeholder token for the compiled test classes directory.
pub const TEST_CLASSES_TOKEN: &str = "TEST.CLASSES";

/// Everything one materialization run needs. Owned for the duration of the
/// run; nothing is shared across runs.
pub struct Materializer {
    /// The descriptor file declaring the desired modules.
    pub module_definition_file: PathBuf,
    /// Root directory the module-path layout is generated under.
    pub modules_directory: PathBuf,
    /// When the modules directory already exists: `false` reuses it as-is,
    /// `true` deletes and recreates it.
    pub clean_modules_directory: bool,
    /// Compiled main classes, copied for `$CLASSES$`.
    pub classes_directory: PathBuf,
    /// Compiled test classes, copied for `$TEST.CLASSES$`.
    pub test_classes_directory: PathBuf,
}

/// What a run produced.
#[derive(Debug, PartialEq, Eq)]
pub enum MaterializedLayout {
    /// The modules directory already existed and `clean` was off; it was
    /// left untouched.
    Reused,
    /// The layout was (re)generated, with this many modules written.
    Generated { modules: usize },
}

impl Materializer {
    /// Materialize the module-path directory.
    ///
    /// Any step failure aborts the whole run; no partial module set is
    /// considered successful.
    pub fn create_modules_directory(
        &self,
        graph: &dyn DependencyGraphSource,
        repository: &dyn ArtifactRepository,
    ) -> Result<MaterializedLayout> {
        if self.initialize_modules_directory()? {
            return Ok(MaterializedLayout::Reused);
        }

        if !self.module_definition_file.exists() {
            bail!(
                "could not find module definition file {}",
                self.module_definition_file.display()
            );
        }

        let index = DependencyIndex::build(graph, repository)?;

        let parsed = parse_descriptor_file(&self.module_definition_file)
            .with_context(|| {
                format!(
                    "parsing module definition file {}",
                    self.module_definition_file.display()
                )
            })?;

        let bootstrap = synthesize_bootstrap_module(
            &parsed.target_namespace,
            parsed.test_module_resources.as_ref(),
            parsed.test_module_dependencies.as_ref(),
        )?;

        let mut count = 0;
        for module in std::iter::once(&bootstrap).chain(parsed.modules.iter()) {
            self.process_module(module, &index)?;
            count += 1;
        }

        Ok(MaterializedLayout::Generated { modules: count })
    }

    /// Returns `true` when an existing layout is being reused and the run
    /// should stop here.
    fn initialize_modules_directory(&self) -> Result<bool> {
        let dir = &self.modules_directory;
        if dir.exists() {
            if !self.clean_modules_directory {
                info!(
                    "reusing modules directory {}; to recreate it next time run with clean = true",
                    dir.display()
                );
                return Ok(true);
            }
            info!(
                "deleting existing modules directory {}; it will be recreated",
                dir.display()
            );
            fs::remove_dir_all(dir)
                .with_context(|| format!("deleting modules directory {}", dir.display()))?;
        }
        fs::create_dir_all(dir)
            .with_context(|| format!("could not create directory {}", dir.display()))?;
        Ok(false)
    }

    fn process_module(&self, module: &Module, index: &DependencyIndex) -> Result<()> {
        let module_dir = self.create_module_directory(module.name()?)?;

        // Resolution mutates the tree in place, so work on a copy of the
        // parsed module.
        let mut module = module.clone();
        for reference in module.node.find_placeholders() {
            self.resolve_placeholder(&mut module, &reference, index, &module_dir)?;
        }

        module.write_descriptor(&module_dir)
    }

    /// `a.b.c` becomes `<modulesDirectory>/a/b/c/main`. The parent already
    /// exists, so a creation failure here signals a name collision or a
    /// permission fault and is fatal.
    fn create_module_directory(&self, name: &str) -> Result<PathBuf> {
        let mut dir = self.modules_directory.clone();
        for segment in name.split('.') {
            dir.push(segment);
        }
        dir.push("main");
        fs::create_dir_all(&dir)
            .with_context(|| format!("could not create directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Resolve one placeholder: the two local-output tokens copy a whole
    /// directory tree, a `group:artifact` token copies the indexed artifact
    /// file, and anything else is warned about and left unresolved.
    fn resolve_placeholder(
        &self,
        module: &mut Module,
        reference: &PlaceholderRef,
        index: &DependencyIndex,
        module_dir: &Path,
    ) -> Result<()> {
        let token = module
            .node
            .placeholder_value(reference)
            .map(str::to_owned)
            .unwrap_or_default();
        debug!("searching for artifact {token}");

        if token.contains(':') {
            let Some(artifact) = index.lookup(&token) else {
                warn!("no artifact matching {token} found in project dependencies");
                return Ok(());
            };
            let copied = copy::copy_file_to_dir(&artifact.file, module_dir)?;
            module.node.resolve_placeholder(reference, file_name(&copied)?);
        } else if token == CLASSES_TOKEN {
            let copied = copy::copy_directory(&self.classes_directory, module_dir)?;
            module.node.resolve_placeholder(reference, file_name(&copied)?);
        } else if token == TEST_CLASSES_TOKEN {
            let copied = copy::copy_directory(&self.test_classes_directory, module_dir)?;
            module.node.resolve_placeholder(reference, file_name(&copied)?);
        } else {
            warn!("unrecognized placeholder ${token}$; leaving it unresolved");
        }
        Ok(())
    }
}

/// Build the implicit bootstrap module: the booter `main-class`, resource
/// roots for the two pinned bootstrap artifacts, any pass-through resources
/// from `test-module-resources`, and a `dependencies` element when
/// `test-module-dependencies` was declared and non-empty.
fn synthesize_bootstrap_module(
    target_namespace: &str,
    test_module_resources: Option<&ElementNode>,
    test_module_dependencies: Option<&ElementNode>,
) -> Result<Module> {
    if target_namespace != SUPPORTED_TARGET_NAMESPACE {
        bail!(
            "invalid jboss modules version '{target_namespace}'; only {SUPPORTED_TARGET_NAMESPACE} is supported"
        );
    }

    let mut module = Module::new(ModuleKind::Bootstrap, target_namespace);
    module.node.add_attribute("name", BOOTSTRAP_MODULE_NAME);

    let mut main_class = ElementNode::new("main-class");
    main_class.add_attribute("name", BOOTER_MAIN_CLASS);
    module.node.add_child(main_class);

    let mut resources = ElementNode::new("resources");
    add_resource_root(
        &mut resources,
        &coordinate(SUREFIRE_API_GROUP, SUREFIRE_API_ARTIFACT),
    );
    add_resource_root(
        &mut resources,
        &coordinate(MODULAR_BOOTER_GROUP, MODULAR_BOOTER_ARTIFACT),
    );
    if let Some(section) = test_module_resources {
        for child in section.children() {
            resources.add_child(child.clone());
        }
    }
    module.node.add_child(resources);

    if let Some(section) = test_module_dependencies {
        if !section.children().is_empty() {
            let mut dependencies = ElementNode::new("dependencies");
            for child in section.children() {
                dependencies.add_child(child.clone());
            }
            module.node.add_child(dependencies);
        }
    }

    Ok(module)
}

fn add_resource_root(resources: &mut ElementNode, coordinate: &str) {
    let mut resource = ElementNode::new("resource-root");
    resource.add_attribute("path", format!("${coordinate}$"));
    resources.add_child(resource);
}

fn file_name(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .with_context(|| format!("path {} has no file name", path.display()))?;
    Ok(name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::MODULE_XML;
    use crate::index::{DependencyNode, LocalRepository, ResolutionState};
    use crate::index::{PLUGIN_FORK_VERSION, PROPER_SUREFIRE_VERSION};
    use tempfile::TempDir;

    const DESCRIPTOR: &str = r#"<?xml version="1.0"?>
<modules xmlns="urn:jboss:surefire-module:1.0" targetNs="urn:jboss:module:1.0">
  <module name="foo.bar">
    <resources>
      <resource-root path="$CLASSES$"/>
      <resource-root path="$org.foo:bar$"/>
    </resources>
  </module>
</modules>
"#;

    struct Fixture {
        temp: TempDir,
        materializer: Materializer,
        repository: LocalRepository,
    }

    fn fixture(descriptor: &str, clean: bool) -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let definition = root.join("module-def.xml");
        fs::write(&definition, descriptor).unwrap();

        let classes = root.join("classes");
        fs::create_dir_all(classes.join("com/example")).unwrap();
        fs::write(classes.join("com/example/Foo.class"), b"cafebabe").unwrap();

        let test_classes = root.join("test-classes");
        fs::create_dir(&test_classes).unwrap();
        fs::write(test_classes.join("FooTest.class"), b"cafebabe").unwrap();

        let repository = LocalRepository::new(root.join("repo"));
        install(&repository, SUREFIRE_API_GROUP, SUREFIRE_API_ARTIFACT, PROPER_SUREFIRE_VERSION);
        install(&repository, MODULAR_BOOTER_GROUP, MODULAR_BOOTER_ARTIFACT, PLUGIN_FORK_VERSION);

        let materializer = Materializer {
            module_definition_file: definition,
            modules_directory: root.join("modules"),
            clean_modules_directory: clean,
            classes_directory: classes,
            test_classes_directory: test_classes,
        };
        Fixture {
            temp,
            materializer,
            repository,
        }
    }

    fn install(repository: &LocalRepository, group: &str, artifact: &str, version: &str) {
        let path = repository.path_of(group, artifact, version);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, format!("{group}:{artifact}:{version}")).unwrap();
    }

    fn included(group: &str, artifact: &str, version: &str, repository: &LocalRepository) -> DependencyNode {
        install(repository, group, artifact, version);
        DependencyNode {
            group_id: group.to_string(),
            artifact_id: artifact.to_string(),
            version: version.to_string(),
            state: ResolutionState::Included,
            file: None,
        }
    }

    #[test]
    fn test_materializes_declared_module_layout() {
        let f = fixture(DESCRIPTOR, true);
        let graph = vec![included("org.foo", "bar", "1.0", &f.repository)];

        let layout = f
            .materializer
            .create_modules_directory(&graph, &f.repository)
            .unwrap();
        assert_eq!(layout, MaterializedLayout::Generated { modules: 2 });

        // Dotted module name becomes nested directories with a main segment.
        let module_dir = f.temp.path().join("modules/foo/bar/main");
        let xml = fs::read_to_string(module_dir.join(MODULE_XML)).unwrap();
        assert!(xml.contains("<resource-root path=\"classes\"/>"));
        assert!(xml.contains("<resource-root path=\"bar-1.0.jar\"/>"));

        assert!(module_dir.join("classes/com/example/Foo.class").exists());
        assert!(module_dir.join("bar-1.0.jar").exists());
    }

    #[test]
    fn test_bootstrap_module_processed_and_written() {
        let f = fixture(DESCRIPTOR, true);
        let graph = vec![included("org.foo", "bar", "1.0", &f.repository)];

        f.materializer
            .create_modules_directory(&graph, &f.repository)
            .unwrap();

        let dir = f.temp.path().join("modules/jboss/surefire/module/main");
        let xml = fs::read_to_string(dir.join(MODULE_XML)).unwrap();
        assert!(xml.contains(&format!("<main-class name=\"{BOOTER_MAIN_CLASS}\"/>")));
        assert!(xml.contains("surefire-api-2.6.jar"));
        assert!(dir
            .join(format!("surefire-booter-{PLUGIN_FORK_VERSION}.jar"))
            .exists());
    }

    #[test]
    fn test_bootstrap_includes_aux_sections() {
        let descriptor = r#"<modules xmlns="urn:jboss:surefire-module:1.0" targetNs="urn:jboss:module:1.0">
  <test-module-dependencies>
    <module name="dep.one"/>
  </test-module-dependencies>
  <test-module-resources>
    <resource-root path="extra"/>
  </test-module-resources>
</modules>"#;
        let f = fixture(descriptor, true);

        f.materializer
            .create_modules_directory(&Vec::<DependencyNode>::new(), &f.repository)
            .unwrap();

        let xml = fs::read_to_string(
            f.temp
                .path()
                .join("modules/jboss/surefire/module/main")
                .join(MODULE_XML),
        )
        .unwrap();
        assert!(xml.contains("<resource-root path=\"extra\"/>"));
        assert!(xml.contains("<dependencies>"));
        assert!(xml.contains("<module name=\"dep.one\"/>"));
    }

    #[test]
    fn test_empty_dependencies_section_adds_no_element() {
        let descriptor = r#"<modules xmlns="urn:jboss:surefire-module:1.0" targetNs="urn:jboss:module:1.0">
  <test-module-dependencies/>
</modules>"#;
        let f = fixture(descriptor, true);

        f.materializer
            .create_modules_directory(&Vec::<DependencyNode>::new(), &f.repository)
            .unwrap();

        let xml = fs::read_to_string(
            f.temp
                .path()
                .join("modules/jboss/surefire/module/main")
                .join(MODULE_XML),
        )
        .unwrap();
        assert!(!xml.contains("<dependencies>"));
    }

    #[test]
    fn test_existing_directory_reused_without_clean() {
        let f = fixture(DESCRIPTOR, false);
        fs::create_dir(f.temp.path().join("modules")).unwrap();
        fs::write(f.temp.path().join("modules/marker"), b"keep").unwrap();

        let layout = f
            .materializer
            .create_modules_directory(&Vec::<DependencyNode>::new(), &f.repository)
            .unwrap();

        assert_eq!(layout, MaterializedLayout::Reused);
        assert!(f.temp.path().join("modules/marker").exists());
        assert!(!f.temp.path().join("modules/jboss").exists());
    }

    #[test]
    fn test_clean_deletes_and_regenerates() {
        let f = fixture(DESCRIPTOR, true);
        fs::create_dir(f.temp.path().join("modules")).unwrap();
        fs::write(f.temp.path().join("modules/marker"), b"stale").unwrap();

        f.materializer
            .create_modules_directory(&Vec::<DependencyNode>::new(), &f.repository)
            .unwrap();

        assert!(!f.temp.path().join("modules/marker").exists());
        assert!(f.temp.path().join("modules/foo/bar/main").exists());
    }

    #[test]
    fn test_missing_definition_file_is_fatal() {
        let f = fixture(DESCRIPTOR, true);
        fs::remove_file(&f.materializer.module_definition_file).unwrap();

        let err = f
            .materializer
            .create_modules_directory(&Vec::<DependencyNode>::new(), &f.repository)
            .unwrap_err();
        assert!(err.to_string().contains("module definition file"));
    }

    #[test]
    fn test_unsupported_target_namespace_is_fatal() {
        let descriptor = r#"<modules xmlns="urn:jboss:surefire-module:1.0" targetNs="urn:jboss:module:2.0"/>"#;
        let f = fixture(descriptor, true);

        let err = f
            .materializer
            .create_modules_directory(&Vec::<DependencyNode>::new(), &f.repository)
            .unwrap_err();
        assert!(err.to_string().contains("invalid jboss modules version"));
    }

    #[test]
    fn test_unresolved_coordinate_left_in_place() {
        // org.foo:bar is not in the dependency graph.
        let f = fixture(DESCRIPTOR, true);

        f.materializer
            .create_modules_directory(&Vec::<DependencyNode>::new(), &f.repository)
            .unwrap();

        let module_dir = f.temp.path().join("modules/foo/bar/main");
        let xml = fs::read_to_string(module_dir.join(MODULE_XML)).unwrap();
        // Sentinels stripped, value unresolved, no file copied.
        assert!(xml.contains("<resource-root path=\"org.foo:bar\"/>"));
        assert!(!module_dir.join("bar-1.0.jar").exists());
    }

    #[test]
    fn test_unknown_local_token_left_in_place() {
        let descriptor = r#"<modules xmlns="urn:jboss:surefire-module:1.0" targetNs="urn:jboss:module:1.0">
  <module name="m">
    <resources>
      <resource-root path="$MYSTERY$"/>
    </resources>
  </module>
</modules>"#;
        let f = fixture(descriptor, true);

        f.materializer
            .create_modules_directory(&Vec::<DependencyNode>::new(), &f.repository)
            .unwrap();

        let xml =
            fs::read_to_string(f.temp.path().join("modules/m/main").join(MODULE_XML)).unwrap();
        assert!(xml.contains("<resource-root path=\"MYSTERY\"/>"));
    }

    #[test]
    fn test_missing_artifact_file_is_fatal() {
        let f = fixture(DESCRIPTOR, true);
        // Indexed but not actually present in the repository.
        let graph = vec![DependencyNode {
            group_id: "org.foo".to_string(),
            artifact_id: "bar".to_string(),
            version: "1.0".to_string(),
            state: ResolutionState::Included,
            file: None,
        }];

        let err = f
            .materializer
            .create_modules_directory(&graph, &f.repository)
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_module_without_name_fails_at_directory_creation() {
        let descriptor = r#"<modules xmlns="urn:jboss:surefire-module:1.0" targetNs="urn:jboss:module:1.0">
  <module/>
</modules>"#;
        let f = fixture(descriptor, true);

        let err = f
            .materializer
            .create_modules_directory(&Vec::<DependencyNode>::new(), &f.repository)
            .unwrap_err();
        assert!(err.to_string().contains("'name' attribute"));
    }

    #[test]
    fn test_repeated_clean_runs_are_byte_identical() {
        let f = fixture(DESCRIPTOR, true);
        let graph = vec![included("org.foo", "bar", "1.0", &f.repository)];
        let descriptor_path = f.temp.path().join("modules/foo/bar/main").join(MODULE_XML);

        f.materializer
            .create_modules_directory(&graph, &f.repository)
            .unwrap();
        let first = fs::read(&descriptor_path).unwrap();

        f.materializer
            .create_modules_directory(&graph, &f.repository)
            .unwrap();
        let second = fs::read(&descriptor_path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_test_classes_token_copies_test_output() {
        let descriptor = r#"<modules xmlns="urn:jboss:surefire-module:1.0" targetNs="urn:jboss:module:1.0">
  <module name="tests">
    <resources>
      <resource-root path="$TEST.CLASSES$"/>
    </resources>
  </module>
</modules>"#;
        let f = fixture(descriptor, true);

        f.materializer
            .create_modules_directory(&Vec::<DependencyNode>::new(), &f.repository)
            .unwrap();

        let module_dir = f.temp.path().join("modules/tests/main");
        let xml = fs::read_to_string(module_dir.join(MODULE_XML)).unwrap();
        assert!(xml.contains("<resource-root path=\"test-classes\"/>"));
        assert!(module_dir.join("test-classes/FooTest.class").exists());
    }
}
