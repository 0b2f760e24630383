/// Lua script for the fixed window "allow and count" primitive
///
/// Reads the counter, refuses without mutation once it has reached the limit,
/// otherwise increments it and arms the window expiry on the first increment.
/// Running as one script makes the whole step atomic in Redis.
///
/// KEYS[1] = the counter key
/// ARGV[1] = maximum requests per window
/// ARGV[2] = window duration (seconds)
///
/// Returns: [allowed (0/1), current count]
pub const FIXED_WINDOW_ALLOW_SCRIPT: &str = r#"
local key = KEYS[1]
local max_requests = tonumber(ARGV[1])
local window = tonumber(ARGV[2])

-- Missing key counts as zero
local current = tonumber(redis.call('GET', key) or '0')

if current >= max_requests then
    return {0, current}
end

current = redis.call('INCR', key)

-- Set expiry on first request
if current == 1 then
    redis.call('EXPIRE', key, window)
elseif redis.call('TTL', key) == -1 then
    -- Counter survived without expiry, arm it so it cannot live forever
    redis.call('EXPIRE', key, window)
end

return {1, current}
"#;
