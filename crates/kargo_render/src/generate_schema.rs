use anyhow::Context;
use camino::Utf8Path;

/// Write the embedded repo-configuration schema to `.schema/kargo-render.json`.
pub fn generate_schema_to_disk() -> anyhow::Result<()> {
    let schema_dir = Utf8Path::new(".schema");
    fs_err::create_dir_all(schema_dir).context("cannot create .schema directory")?;
    let path = schema_dir.join("kargo-render.json");
    fs_err::write(&path, kargo_render_core::config_schema())
        .with_context(|| format!("cannot write schema to {path}"))?;
    println!("wrote configuration schema to {path}");
    Ok(())
}
