//! Maps well-known Android framework attribute resource IDs to their bare
//! name, for the fallback path in [`crate::axml`] when a string-pool entry
//! for an attribute name is empty or corrupted.
//!
//! This table is a representative subset of `android:attr` IDs (the ones the
//! façade's manifest queries actually need: name/label/icon, SDK versions,
//! version code/name, the manifest/application/activity/intent-filter
//! vocabulary). A faithful port would carry the full generated table the
//! platform builds from `frameworks/base/core/res/res/values/public.xml`;
//! that generated table is not present in this project's reference material
//! (only its generator script is), so it is not reproduced here. Entries
//! absent from this table simply fall through to the empty-name case.

const ATTRIBUTES: &[(u32, &str)] = &[
    (0x01010001, "label"),
    (0x01010002, "icon"),
    (0x01010003, "name"),
    (0x01010021, "permission"),
    (0x01010025, "enabled"),
    (0x0101020c, "minSdkVersion"),
    (0x01010270, "targetSdkVersion"),
    (0x0101021b, "versionCode"),
    (0x0101021c, "versionName"),
    (0x0101026c, "installLocation"),
    (0x010100d0, "theme"),
    (0x0101002c, "exported"),
    (0x01010018, "value"),
    (0x0101001b, "scheme"),
    (0x0101001c, "host"),
    (0x0101001d, "port"),
    (0x0101001e, "path"),
    (0x0101001f, "pathPrefix"),
    (0x01010020, "pathPattern"),
    (0x01010022, "readPermission"),
    (0x01010023, "writePermission"),
    (0x0101004c, "debuggable"),
    (0x0101004e, "allowBackup"),
    (0x0101052c, "fullBackupContent"),
    (0x0101057e, "requestLegacyExternalStorage"),
    (0x01010231, "authorities"),
    (0x010103f7, "networkSecurityConfig"),
    (0x0101055f, "roundIcon"),
    (0x0101002d, "process"),
    (0x0101000e, "taskAffinity"),
    (0x0101001a, "mimeType"),
    (0x0101000d, "launchMode"),
    (0x0101005b, "screenOrientation"),
    (0x0101026a, "configChanges"),
];

/// Looks up a canonical attribute name by resource ID. Returns `None` for
/// anything outside this representative subset.
pub fn get_attribute_name(resource_id: u32) -> Option<&'static str> {
    ATTRIBUTES
        .iter()
        .find(|(id, _)| *id == resource_id)
        .map(|(_, name)| *name)
}
