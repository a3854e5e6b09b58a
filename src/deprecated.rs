//! Packages known to be deprecated even where the registry does not flag the latest release.

const KNOWN_DEPRECATED: &[(&str, &str)] = &[
    ("babel-eslint", "use @babel/eslint-parser instead"),
    ("coffee-script", "renamed to coffeescript"),
    ("gulp-util", "split into standalone modules, see gulpjs/gulp-util"),
    ("har-validator", "no longer maintained"),
    ("istanbul", "use nyc instead"),
    ("left-pad", "use String.prototype.padStart()"),
    ("node-sass", "use sass (Dart Sass) instead"),
    ("node-uuid", "use uuid instead"),
    ("querystring", "use URLSearchParams instead"),
    ("request", "request has been deprecated, see request/request#3142"),
    ("request-promise", "request has been deprecated, see request/request#3142"),
    ("tslint", "use eslint with typescript-eslint instead"),
];

/// Looks up the built-in deprecation message for `package`.
pub fn known_deprecation(package: &str) -> Option<&'static str> {
    KNOWN_DEPRECATED
        .binary_search_by(|(name, _)| name.cmp(&package))
        .ok()
        .map(|index| KNOWN_DEPRECATED[index].1)
}
