use super::*;
use std::io::Write as _;
use std::path::Path;

#[test]
fn configuration_errors_are_classified() {
    assert!(BuildError::MissingKaptArchive.is_configuration_error());
    assert!(BuildError::UnresolvableIdentity {
        role: "service implementation",
        name: "com.example.Outer$1".into(),
    }
    .is_configuration_error());
    assert!(!BuildError::CompilerNotFound("kotlinc".into()).is_configuration_error());
    assert!(!BuildError::io("/work", std::io::Error::other("disk full")).is_configuration_error());
}

#[test]
fn invalid_state_names_both_states() {
    let error = BuildError::InvalidState {
        expected: InvocationState::Staged,
        actual: InvocationState::Completed,
    };
    assert_eq!(error.to_string(), "Invocation is Completed, expected Staged");
}

#[test]
fn processor_bindings_reach_the_services_archive() {
    let dir = tempfile::tempdir().expect("temp dir");
    let request = CompilationRequest::new(dir.path()).with_options(
        CompilerOptions::default()
            .with_annotation_processor("com.example.FirstProcessor")
            .with_annotation_processor("com.example.SecondProcessor"),
    );

    let jar = request.layout().services_jar();
    package_services(&request.service_bindings(), &jar).expect("package services");

    let file = std::fs::File::open(&jar).expect("open services jar");
    let mut archive = zip::ZipArchive::new(file).expect("read services jar");
    let mut entry = archive
        .by_name("META-INF/services/javax.annotation.processing.Processor")
        .expect("processor entry");
    let mut body = String::new();
    std::io::Read::read_to_string(&mut entry, &mut body).unwrap();
    assert_eq!(body, "com.example.FirstProcessor\ncom.example.SecondProcessor\n");
}

#[cfg(unix)]
#[test]
fn process_compiler_forwards_both_streams() {
    let dir = tempfile::tempdir().expect("temp dir");
    let script = write_exec_script(
        dir.path(),
        "kotlinc",
        "#!/bin/sh\necho \"args:$*\"\necho 'e: broken' 1>&2\nexit 1\n",
    );

    let mut output = Vec::new();
    let exit_code = ProcessCompiler::kotlinc(&script)
        .execute(&["-d".to_string(), "/tmp/out".to_string()], &mut output)
        .expect("run fake compiler");

    let printed = String::from_utf8(output).unwrap();
    assert_eq!(exit_code, ExitCode::CompilationError);
    assert!(printed.contains("args:-d /tmp/out\n"));
    assert!(printed.contains("e: broken\n"));
}

#[cfg(unix)]
#[test]
fn jvm_launcher_puts_compiler_jar_first() {
    let dir = tempfile::tempdir().expect("temp dir");
    let java = write_exec_script(dir.path(), "java", "#!/bin/sh\necho \"$*\"\nexit 0\n");
    let jar = dir.path().join("kotlin-compiler.jar");

    let mut output = Vec::new();
    let exit_code = ProcessCompiler::jvm(&java, &jar)
        .execute(&["-version".to_string()], &mut output)
        .expect("run fake java");

    assert_eq!(exit_code, ExitCode::Ok);
    let printed = String::from_utf8(output).unwrap();
    assert_eq!(
        printed.trim_end(),
        format!(
            "-cp {} org.jetbrains.kotlin.cli.jvm.K2JVMCompiler -version",
            jar.display()
        )
    );
}

#[cfg(unix)]
#[test]
fn signal_termination_is_a_generic_failure() {
    let dir = tempfile::tempdir().expect("temp dir");
    let script = write_exec_script(dir.path(), "kotlinc", "#!/bin/sh\nkill -9 $$\n");

    let exit_code = ProcessCompiler::kotlinc(&script)
        .execute(&[], &mut std::io::sink())
        .expect("run fake compiler");
    assert_eq!(exit_code, ExitCode::Failure(None));
}

#[cfg(unix)]
fn write_exec_script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).expect("create script");
    file.write_all(body.as_bytes()).expect("write script");
    drop(file);

    let mut permissions = std::fs::metadata(&path).expect("metadata").permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).expect("set permissions");
    path
}
