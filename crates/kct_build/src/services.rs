use crate::BuildError;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::debug;
use zip::write::FileOptions;
use zip::ZipWriter;

/// Directory `java.util.ServiceLoader` reads provider registrations from.
pub const SERVICES_PREFIX: &str = "META-INF/services/";

/// One provider registration: `implementation` provides `service`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceBinding {
    service: String,
    implementation: String,
}

impl ServiceBinding {
    pub fn new(service: impl Into<String>, implementation: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            implementation: implementation.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn implementation(&self) -> &str {
        &self.implementation
    }

    /// Both sides must name a top-level or member class by its binary name.
    pub fn validate(&self) -> Result<(), BuildError> {
        if !validate_binary_name(&self.service) {
            return Err(BuildError::UnresolvableIdentity {
                role: "service interface",
                name: self.service.clone(),
            });
        }
        if !validate_binary_name(&self.implementation) {
            return Err(BuildError::UnresolvableIdentity {
                role: "service implementation",
                name: self.implementation.clone(),
            });
        }
        Ok(())
    }
}

/// True when `name` is a JVM binary class name a service loader can
/// instantiate. Anonymous and local classes (`Outer$1`, `Outer$1Local`) have
/// no stable name and are rejected.
pub fn validate_binary_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    name.split('.').all(|segment| {
        let mut parts = segment.split('$');
        let head_ok = parts.next().map(is_java_identifier).unwrap_or(false);
        head_ok
            && parts.all(|member| {
                member
                    .chars()
                    .next()
                    .map(|first| !first.is_ascii_digit())
                    .unwrap_or(false)
                    && is_java_identifier(member)
            })
    })
}

fn is_java_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|ch| ch.is_alphanumeric() || ch == '_')
        }
        _ => false,
    }
}

/// Write a jar holding one `META-INF/services/<service>` entry per service
/// interface, each listing its implementations in the order supplied.
///
/// A binding repeated verbatim is registered once.
pub fn package_services(bindings: &[ServiceBinding], destination: &Path) -> Result<(), BuildError> {
    let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut seen = BTreeSet::new();

    for binding in bindings {
        binding.validate()?;
        if !seen.insert((binding.service(), binding.implementation())) {
            debug!(
                service = binding.service(),
                implementation = binding.implementation(),
                "dropping duplicate service registration"
            );
            continue;
        }
        grouped
            .entry(binding.service())
            .or_default()
            .push(binding.implementation());
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|error| BuildError::io(parent, error))?;
    }
    let file = File::create(destination).map_err(|error| BuildError::io(destination, error))?;
    let archive_error = |source: zip::result::ZipError| BuildError::Archive {
        path: destination.to_path_buf(),
        source,
    };

    let mut writer = ZipWriter::new(file);
    for (service, implementations) in &grouped {
        writer
            .start_file(format!("{SERVICES_PREFIX}{service}"), FileOptions::default())
            .map_err(archive_error)?;

        let mut body = String::new();
        for implementation in implementations {
            body.push_str(implementation);
            body.push('\n');
        }
        writer
            .write_all(body.as_bytes())
            .map_err(|error| BuildError::io(destination, error))?;
    }
    writer.finish().map_err(archive_error)?;

    debug!(
        path = %destination.display(),
        services = grouped.len(),
        "packaged service registrations"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn read_entries(path: &Path) -> BTreeMap<String, String> {
        let mut archive = ZipArchive::new(File::open(path).expect("open jar")).expect("read jar");
        let mut entries = BTreeMap::new();
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).expect("entry");
            let mut body = String::new();
            entry.read_to_string(&mut body).expect("entry body");
            entries.insert(entry.name().to_string(), body);
        }
        entries
    }

    #[test]
    fn groups_implementations_by_service() {
        let dir = tempfile::tempdir().expect("temp dir");
        let jar = dir.path().join("services.jar");
        let bindings = [
            ServiceBinding::new("com.example.IFace1", "com.example.ImplA"),
            ServiceBinding::new("com.example.IFace2", "com.example.ImplC"),
            ServiceBinding::new("com.example.IFace1", "com.example.ImplB"),
        ];

        package_services(&bindings, &jar).expect("package services");

        let entries = read_entries(&jar);
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries["META-INF/services/com.example.IFace1"],
            "com.example.ImplA\ncom.example.ImplB\n"
        );
        assert_eq!(
            entries["META-INF/services/com.example.IFace2"],
            "com.example.ImplC\n"
        );
    }

    #[test]
    fn duplicate_registrations_are_written_once() {
        let dir = tempfile::tempdir().expect("temp dir");
        let jar = dir.path().join("services.jar");
        let bindings = [
            ServiceBinding::new("a.Service", "a.Impl"),
            ServiceBinding::new("a.Service", "a.Impl"),
        ];

        package_services(&bindings, &jar).expect("package services");

        assert_eq!(read_entries(&jar)["META-INF/services/a.Service"], "a.Impl\n");
    }

    #[test]
    fn anonymous_implementation_is_a_configuration_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let jar = dir.path().join("services.jar");
        let bindings = [ServiceBinding::new("a.Service", "a.Outer$1")];

        let error = package_services(&bindings, &jar).expect_err("anonymous class must fail");
        assert!(matches!(
            error,
            BuildError::UnresolvableIdentity {
                role: "service implementation",
                ..
            }
        ));
        assert!(!jar.exists());
    }

    #[test]
    fn binary_names() {
        assert!(validate_binary_name("Processor"));
        assert!(validate_binary_name("com.example.Outer$Inner"));
        assert!(validate_binary_name("com.example.Outer$Companion"));
        assert!(!validate_binary_name(""));
        assert!(!validate_binary_name("com..example.Foo"));
        assert!(!validate_binary_name("com.example.Outer$1Local"));
        assert!(!validate_binary_name("com.example.9Lives"));
        assert!(!validate_binary_name("com.example.Foo$"));
    }

    #[test]
    fn unwritable_destination_is_an_io_fault() {
        let dir = tempfile::tempdir().expect("temp dir");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").expect("write blocker");

        let bindings = [ServiceBinding::new("a.Service", "a.Impl")];
        let error = package_services(&bindings, &blocker.join("services.jar"))
            .expect_err("cannot write below a file");
        assert!(matches!(error, BuildError::Io { .. }));
    }
}
