use std::sync::{Arc, Mutex};

use actix_web::web::Query;
use actix_web::{get, web, HttpResponse, Responder};
use serde::Deserialize;
use tera::{Context, Tera};

use crate::node::finger_table::FingerTable;
use crate::node::successor_list::SuccessorList;
use crate::node::Node;
use crate::storage::StorageManager;
use crate::threads::client_api::{client_get, client_put};
use crate::utils::config::Config;
use crate::utils::types::HashPos;

/// State the status page renders from, shared with the gRPC service.
pub struct WebHandles {
    pub node: Node,
    pub finger_table: Arc<Mutex<FingerTable>>,
    pub predecessor: Arc<Mutex<Option<Node>>>,
    pub successor_list: Arc<Mutex<SuccessorList>>,
    pub storage: Arc<Mutex<StorageManager>>,
}

#[derive(Deserialize)]
struct QueryParams {
    get_request_key: Option<String>,
    put_request_key: Option<String>,
    put_request_value: Option<String>,
}

#[get("/")]
pub async fn index(
    handles: web::Data<WebHandles>,
    config: web::Data<Config>,
    query_params_option: Option<Query<QueryParams>>,
) -> impl Responder {
    let tera = match Tera::new("static/html/**/*") {
        Ok(tera) => tera,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .body(format!("template error: {}", e))
        }
    };
    let mut context = Context::new();

    if let Some(query_params) = query_params_option {
        match query_params.0 {
            QueryParams {
                get_request_key: Some(get_key),
                put_request_key: None,
                put_request_value: None,
            } => {
                perform_get_and_update_context(&get_key, &handles, &config, &mut context).await;
            }
            QueryParams {
                get_request_key: None,
                put_request_key: Some(put_key),
                put_request_value: Some(put_value),
            } => {
                perform_put_and_update_context(&put_key, &put_value, &handles, &config, &mut context)
                    .await;
            }
            _ => {}
        }
    }

    context.insert("title", "Ring Node");
    context.insert("config", config.get_ref());
    context.insert("node", &handles.node);
    context.insert("max_pos", &HashPos::MAX);
    {
        let predecessor = handles.predecessor.lock().unwrap().clone();
        context.insert("predecessor", &predecessor);
    }
    {
        let successor_list: SuccessorList = handles.successor_list.lock().unwrap().clone();
        context.insert("successors", &successor_list.successors);
    }
    {
        let finger_table: FingerTable = handles.finger_table.lock().unwrap().clone();
        context.insert("fingers", &finger_table.fingers);
    }
    {
        let summaries = handles.storage.lock().unwrap().summaries();
        context.insert("stores", &summaries);
    }

    match tera.render("index.html", &context) {
        Ok(html) => HttpResponse::Ok().content_type("text/html").body(html),
        Err(e) => HttpResponse::InternalServerError().body(format!("render error: {}", e)),
    }
}

async fn perform_get_and_update_context(
    key: &str,
    handles: &WebHandles,
    config: &Config,
    context: &mut Context,
) {
    match client_get(key, &handles.node.address, config.retry_budget).await {
        Some(value) => {
            context.insert("response_status", "OK");
            context.insert("get_response", &String::from_utf8_lossy(&value).to_string());
        }
        None => {
            context.insert("response_status", "NOT_FOUND");
        }
    }
}

async fn perform_put_and_update_context(
    key: &str,
    value: &str,
    handles: &WebHandles,
    config: &Config,
    context: &mut Context,
) {
    if client_put(key, value, &handles.node.address, config.retry_budget).await {
        context.insert("response_status", "STORED");
    } else {
        context.insert("response_status", "DROPPED");
    }
}
