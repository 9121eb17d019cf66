//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Locus Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[connectivity]
# reachability_debounce_ms = 1500   # 0-10000
# lifecycle_debounce_ms = 250       # 0-5000

[presence]
# enabled = true
# status_path = "status"
# write_timeout_ms = 5000           # 500-30000
# retry_backoff_ms = 1000           # 100-30000

[push]
# enabled = true
# users_collection = "users"
# token_timeout_ms = 10000          # 1000-60000
# read_timeout_ms = 5000            # 500-30000
# write_timeout_ms = 5000           # 500-30000

[settings]
# collection = "notificationSettings"
# read_timeout_ms = 5000            # 500-30000
# write_timeout_ms = 5000           # 500-30000

[cache]
# directory = ""                    # empty = platform data directory
# file_name = "cache.json"

[logging]
level = "INFO"                      # DEBUG, INFO, WARNING, ERROR
"##
    .to_string()
}
