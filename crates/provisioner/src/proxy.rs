//! 로드 밸런서 설정 생성
//!
//! [`render_nginx_config`]는 레플리카 별칭 목록으로 nginx.conf 전체를 만드는
//! 순수 함수입니다. 같은 입력에는 항상 바이트 단위로 같은 출력을 냅니다.
//!
//! - `upstream backend`: 입력 순서대로 `server <alias>:5678;`, `ip_hash` 고정 세션, keepalive
//! - `location /`: 원본 요청 정보를 헤더로 전달
//! - `location ~ ^/(rest/)?push`: 웹소켓 업그레이드 강제, 버퍼링 해제, 긴 타임아웃
//!
//! 정규식 location은 접두어 location `/`보다 우선하므로 push 경로는 항상
//! 두 번째 블록으로 처리됩니다.

use std::fmt::Write as _;

use testbed_core::types::APP_PORT;

/// 컨테이너 안의 nginx 설정 경로
pub const NGINX_CONFIG_PATH: &str = "/etc/nginx/nginx.conf";

/// upstream 유휴 keepalive 연결 수
pub const UPSTREAM_KEEPALIVE: u32 = 32;

/// 기본 location 타임아웃 (connect, send, read) 초
pub const PRIMARY_TIMEOUTS_SECS: (u32, u32, u32) = (30, 300, 300);

/// push location 타임아웃 (connect, send, read) 초
pub const PUSH_TIMEOUTS_SECS: (u32, u32, u32) = (75, 3600, 3600);

/// push(웹소켓/SSE) 경로 정규식
pub const PUSH_LOCATION_PATTERN: &str = "^/(rest/)?push";

/// 레플리카 별칭 목록으로 nginx.conf를 생성합니다.
///
/// 각 별칭은 `<alias>:5678`로 upstream에 들어갑니다. 빈 목록 검증은
/// 호출 측(로드 밸런서 규칙)에서 수행합니다.
pub fn render_nginx_config<S: AsRef<str>>(upstream_aliases: &[S]) -> String {
    let mut servers = String::new();
    for alias in upstream_aliases {
        // String에 대한 write!는 실패하지 않음
        let _ = writeln!(servers, "        server {}:{APP_PORT};", alias.as_ref());
    }

    let (p_connect, p_send, p_read) = PRIMARY_TIMEOUTS_SECS;
    let (s_connect, s_send, s_read) = PUSH_TIMEOUTS_SECS;

    format!(
        r#"worker_processes auto;

events {{
    worker_connections 1024;
}}

http {{
    map $http_upgrade $connection_upgrade {{
        default upgrade;
        ''      close;
    }}

    upstream backend {{
        ip_hash;
{servers}        keepalive {UPSTREAM_KEEPALIVE};
    }}

    server {{
        listen 80;

        location / {{
            proxy_pass http://backend;
            proxy_http_version 1.1;
            proxy_set_header Host $host;
            proxy_set_header X-Real-IP $remote_addr;
            proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
            proxy_set_header X-Forwarded-Proto $scheme;
            proxy_set_header Upgrade $http_upgrade;
            proxy_set_header Connection $connection_upgrade;
            proxy_connect_timeout {p_connect}s;
            proxy_send_timeout {p_send}s;
            proxy_read_timeout {p_read}s;
        }}

        location ~ {PUSH_LOCATION_PATTERN} {{
            proxy_pass http://backend;
            proxy_http_version 1.1;
            proxy_set_header Host $host;
            proxy_set_header X-Real-IP $remote_addr;
            proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
            proxy_set_header X-Forwarded-Proto $scheme;
            proxy_set_header Upgrade $http_upgrade;
            proxy_set_header Connection "upgrade";
            proxy_buffering off;
            proxy_cache off;
            proxy_connect_timeout {s_connect}s;
            proxy_send_timeout {s_send}s;
            proxy_read_timeout {s_read}s;
        }}
    }}
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block<'a>(config: &'a str, header: &str) -> &'a str {
        let start = config.find(header).unwrap();
        let end = config[start..].find("}").unwrap();
        &config[start..start + end]
    }

    fn timeout_secs(block: &str, directive: &str) -> u32 {
        let line = block
            .lines()
            .find(|l| l.trim_start().starts_with(directive))
            .unwrap();
        line.trim()
            .trim_start_matches(directive)
            .trim()
            .trim_end_matches(';')
            .trim_end_matches('s')
            .parse()
            .unwrap()
    }

    #[test]
    fn upstream_lists_every_replica_in_order() {
        let aliases: Vec<String> = (1..=3).map(|k| format!("demo-n8n-main-{k}")).collect();
        let config = render_nginx_config(&aliases);
        let upstream = block(&config, "upstream backend");

        let servers: Vec<&str> = upstream
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with("server "))
            .collect();
        assert_eq!(
            servers,
            vec![
                "server demo-n8n-main-1:5678;",
                "server demo-n8n-main-2:5678;",
                "server demo-n8n-main-3:5678;",
            ]
        );
        assert!(upstream.contains("ip_hash;"));
        assert!(upstream.contains("keepalive 32;"));
    }

    #[test]
    fn primary_location_forwards_client_headers() {
        let config = render_nginx_config(&["a"]);
        let primary = block(&config, "location / {");
        for header in ["Host", "X-Real-IP", "X-Forwarded-For", "X-Forwarded-Proto"] {
            assert!(
                primary.contains(&format!("proxy_set_header {header} ")),
                "missing {header}"
            );
        }
        assert!(primary.contains("proxy_pass http://backend;"));
    }

    #[test]
    fn push_location_forces_upgrade_and_disables_buffering() {
        let config = render_nginx_config(&["a"]);
        let push = block(&config, "location ~ ^/(rest/)?push");
        assert!(push.contains("proxy_set_header Upgrade $http_upgrade;"));
        assert!(push.contains("proxy_set_header Connection \"upgrade\";"));
        assert!(push.contains("proxy_buffering off;"));
        assert!(push.contains("proxy_read_timeout 3600s;"));
        assert!(push.contains("proxy_send_timeout 3600s;"));
    }

    #[test]
    fn push_timeouts_exceed_primary_timeouts() {
        let config = render_nginx_config(&["a", "b"]);
        let primary = block(&config, "location / {");
        let push = block(&config, "location ~ ");
        for directive in ["proxy_send_timeout", "proxy_read_timeout"] {
            assert!(timeout_secs(push, directive) > timeout_secs(primary, directive));
        }
    }

    #[test]
    fn rendering_is_byte_identical_for_identical_input() {
        let first = render_nginx_config(&["a", "b"]);
        let second = render_nginx_config(&["a".to_owned(), "b".to_owned()]);
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn single_replica_produces_single_server_line() {
        let config = render_nginx_config(&["demo-n8n-main-1"]);
        assert_eq!(config.matches("server demo-").count(), 1);
        assert!(config.contains("listen 80;"));
    }
}
