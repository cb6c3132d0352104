use serde::de::DeserializeOwned;
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{FormData, Headers, HtmlImageElement, Request, RequestInit, Response};

use clicklabel_engine::api::{Endpoint, Method};
use clicklabel_engine::error::ApiError;

fn network_error(err: JsValue) -> ApiError {
    let message = err
        .as_string()
        .or_else(|| {
            err.dyn_ref::<js_sys::Error>()
                .map(|error| String::from(error.message()))
        })
        .unwrap_or_else(|| "request failed".to_string());
    ApiError::Network(message)
}

/// `fetch` wrapper for the detection service.
#[derive(Clone, Debug)]
pub struct Api {
    base: String,
}

impl Api {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Image bytes are loaded by the browser straight from this URL.
    pub fn image_url(&self, project: &str, file: &str) -> String {
        Endpoint::DatasetImage {
            project: project.to_string(),
            file: file.to_string(),
        }
        .url(&self.base)
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &Endpoint) -> Result<T, ApiError> {
        self.fetch(endpoint, None).await
    }

    pub async fn send<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        body: &B,
    ) -> Result<T, ApiError> {
        let payload =
            serde_json::to_string(body).map_err(|err| ApiError::Decode(err.to_string()))?;
        self.fetch(endpoint, Some(Body::Json(payload))).await
    }

    pub async fn upload<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        form: FormData,
    ) -> Result<T, ApiError> {
        self.fetch(endpoint, Some(Body::Form(form))).await
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        body: Option<Body>,
    ) -> Result<T, ApiError> {
        let url = endpoint.url(&self.base);
        let method = endpoint.method();
        log::debug!("{} {url}", method.as_str());

        let init = RequestInit::new();
        init.set_method(method.as_str());
        match body {
            Some(Body::Json(payload)) => {
                let headers = Headers::new().map_err(network_error)?;
                headers
                    .set("Content-Type", "application/json")
                    .map_err(network_error)?;
                init.set_headers(&headers);
                init.set_body(&JsValue::from_str(&payload));
            }
            Some(Body::Form(form)) => init.set_body(&form),
            None => {}
        }
        let request = Request::new_with_str_and_init(&url, &init).map_err(network_error)?;

        let window = web_sys::window().ok_or_else(|| ApiError::Network("no window".into()))?;
        let response = JsFuture::from(window.fetch_with_request(&request))
            .await
            .map_err(network_error)?;
        let response: Response = response
            .dyn_into()
            .map_err(|_| ApiError::Decode("fetch did not return a Response".into()))?;
        let text = JsFuture::from(response.text().map_err(network_error)?)
            .await
            .map_err(network_error)?
            .as_string()
            .unwrap_or_default();

        if !response.ok() {
            return Err(ApiError::Status {
                status: response.status(),
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|err| ApiError::Decode(err.to_string()))
    }
}

enum Body {
    Json(String),
    Form(FormData),
}

/// Resolves once the browser has the image decoded and ready to draw.
pub async fn load_image(url: &str) -> Result<HtmlImageElement, JsValue> {
    let image = HtmlImageElement::new()?;
    image.set_src(url);
    JsFuture::from(image.decode()).await?;
    Ok(image)
}
