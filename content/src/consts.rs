//! Media types and annotation keys.
//!
//! These strings end up in manifests and on disk; they must match what
//! registries and other OCI tooling expect byte for byte.

/// OCI image manifest.
pub const OCI_MANIFEST_SCHEMA1: &str = "application/vnd.oci.image.manifest.v1+json";
/// OCI image index.
pub const OCI_IMAGE_INDEX_SCHEMA: &str = "application/vnd.oci.image.index.v1+json";
/// OCI image config.
pub const OCI_IMAGE_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
/// OCI gzipped layer.
pub const OCI_LAYER: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
/// OCI uncompressed layer.
pub const OCI_UNCOMPRESSED_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";

/// Docker image manifest (schema 2).
pub const DOCKER_MANIFEST_SCHEMA2: &str = "application/vnd.docker.distribution.manifest.v2+json";
/// Docker manifest list.
pub const DOCKER_MANIFEST_LIST_SCHEMA2: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
/// Docker image config.
pub const DOCKER_CONFIG_JSON: &str = "application/vnd.docker.container.image.v1+json";
/// Docker gzipped layer.
pub const DOCKER_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
/// Docker foreign (non-distributable) layer.
pub const DOCKER_FOREIGN_LAYER: &str = "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip";
/// Docker uncompressed layer.
pub const DOCKER_UNCOMPRESSED_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar";

/// Helm chart config.
pub const CHART_CONFIG_MEDIA_TYPE: &str = "application/vnd.cncf.helm.config.v1+json";
/// Helm chart archive layer.
pub const CHART_LAYER_MEDIA_TYPE: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";
/// Helm chart provenance layer.
pub const PROV_LAYER_MEDIA_TYPE: &str = "application/vnd.cncf.helm.chart.provenance.v1.prov";

/// Layer produced by a getter.
pub const FILE_LAYER_MEDIA_TYPE: &str = "application/vnd.content.hauler.file.layer.v1";
/// Config of a file fetched from the local filesystem.
pub const FILE_LOCAL_CONFIG_MEDIA_TYPE: &str =
    "application/vnd.content.hauler.file.local.config.v1+json";
/// Config of an archived local directory.
pub const FILE_DIRECTORY_CONFIG_MEDIA_TYPE: &str =
    "application/vnd.content.hauler.file.directory.config.v1+json";
/// Config of a file fetched over http(s).
pub const FILE_HTTP_CONFIG_MEDIA_TYPE: &str =
    "application/vnd.content.hauler.file.http.config.v1+json";

/// Config of an in-memory artifact.
pub const MEMORY_CONFIG_MEDIA_TYPE: &str = "application/vnd.content.hauler.memory.config.v1+json";

/// Fallback config media type.
pub const UNKNOWN_MANIFEST: &str = "application/vnd.hauler.cattle.io.unknown.v1+json";
/// Fallback layer media type.
pub const UNKNOWN_LAYER: &str = "application/vnd.content.hauler.unknown.layer";

/// Filename hint carried on descriptors.
pub const ANNOTATION_TITLE: &str = "org.opencontainers.image.title";
/// Marks a layer as a gzipped tar that should be extracted when stored.
pub const ANNOTATION_UNPACK: &str = "io.deis.oras.content.unpack";

/// Returns true for media types that name a gzip stream.
pub fn is_gzip_media_type(media_type: &str) -> bool {
    media_type.ends_with("+gzip") || media_type.ends_with(".tar.gzip")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_media_types() {
        assert!(is_gzip_media_type(OCI_LAYER));
        assert!(is_gzip_media_type(DOCKER_LAYER));
        assert!(is_gzip_media_type(DOCKER_FOREIGN_LAYER));
        assert!(is_gzip_media_type(CHART_LAYER_MEDIA_TYPE));
        assert!(!is_gzip_media_type(OCI_UNCOMPRESSED_LAYER));
        assert!(!is_gzip_media_type(FILE_LAYER_MEDIA_TYPE));
        assert!(!is_gzip_media_type(PROV_LAYER_MEDIA_TYPE));
    }
}
