// 测试辅助：本地 HTTP 服务
//
// 按路径前缀返回固定响应，用于在不访问外网的情况下测试 HTTP 客户端

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// 固定响应路由
pub(crate) struct Route {
    pub path_prefix: &'static str,
    pub status: &'static str,
    pub body: Vec<u8>,
}

impl Route {
    pub fn new(path_prefix: &'static str, status: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            path_prefix,
            status,
            body: body.into(),
        }
    }
}

/// 启动本地 HTTP 服务
///
/// # 返回
/// `(base_url, 请求计数)`，base_url 形如 `http://127.0.0.1:12345`
pub(crate) async fn spawn_http_server(routes: Vec<Route>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let routes = Arc::new(routes);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);

            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap_or(0);
            let request = String::from_utf8_lossy(&buf[..n]);
            let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

            let (status, body) = routes
                .iter()
                .find(|route| path.starts_with(route.path_prefix))
                .map(|route| (route.status, route.body.clone()))
                .unwrap_or(("404 Not Found", Vec::new()));

            let header = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            let _ = socket.write_all(header.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{}", addr), hits)
}
