use market_insights_analyst::api::{ErrorResponse, QueryRequest, QueryResponse};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/analyze";

/// How one submission ended, as shown to the user
#[derive(Debug, PartialEq)]
enum Outcome {
    Report(String),
    ServerError(StatusCode, String),
    Unexpected(String),
}

impl Outcome {
    fn render(&self) -> String {
        match self {
            Outcome::Report(report) => format!("\n=== Generated Report ===\n\n{}\n", report),
            Outcome::ServerError(status, detail) => {
                format!("The analyst reported a failure ({}): {}", status, detail)
            }
            Outcome::Unexpected(e) => format!("An unexpected error occurred: {}", e),
        }
    }
}

/// Interpret a response body that arrived with `status`
fn classify(status: StatusCode, body: &str) -> Outcome {
    if status.is_success() {
        return match serde_json::from_str::<QueryResponse>(body) {
            Ok(response) => Outcome::Report(response.report),
            Err(e) => Outcome::Unexpected(format!("malformed response: {}", e)),
        };
    }

    let detail = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.detail)
        .unwrap_or_else(|_| body.trim().to_string());
    Outcome::ServerError(status, detail)
}

async fn submit(client: &Client, api_url: &str, query: &str) -> String {
    let request = QueryRequest {
        query: query.to_string(),
    };

    let response = match client.post(api_url).json(&request).send().await {
        Ok(response) => response,
        Err(e) => return format!("Error connecting to the backend: {}", e),
    };

    let status = response.status();
    match response.text().await {
        Ok(body) => classify(status, &body).render(),
        Err(e) => Outcome::Unexpected(e.to_string()).render(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let api_url = std::env::var("API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

    let client = Client::builder()
        .timeout(Duration::from_secs(600))
        .build()?;

    println!("Market Insights Analyst");
    println!("Ask a financial question; the analyst will research it and write a report.");
    println!("Backend: {}  (Ctrl-D to quit)\n", api_url);

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        stdout.write_all(b"query> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let query = line.trim();
        if query.is_empty() {
            println!("Please enter a query.");
            continue;
        }

        println!("Analyzing... this might take a moment.");
        println!("{}", submit(&client, &api_url, query).await);
    }

    Ok(())
}
