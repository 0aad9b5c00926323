//! Prints the CRD manifests for every kind Ocular registers, one YAML
//! document per kind, separated by `---`.

use kube::CustomResourceExt;
use ocular::crd::{
    ClusterCrawler, ClusterDownloader, ClusterUploader, Crawler, CronSearch, Downloader, Pipeline,
    Profile, Search, Uploader,
};

fn main() {
    let docs = [
        serde_yaml::to_string(&Pipeline::crd()).unwrap(),
        serde_yaml::to_string(&Search::crd()).unwrap(),
        serde_yaml::to_string(&CronSearch::crd()).unwrap(),
        serde_yaml::to_string(&Profile::crd()).unwrap(),
        serde_yaml::to_string(&Downloader::crd()).unwrap(),
        serde_yaml::to_string(&ClusterDownloader::crd()).unwrap(),
        serde_yaml::to_string(&Uploader::crd()).unwrap(),
        serde_yaml::to_string(&ClusterUploader::crd()).unwrap(),
        serde_yaml::to_string(&Crawler::crd()).unwrap(),
        serde_yaml::to_string(&ClusterCrawler::crd()).unwrap(),
    ];
    print!("{}", docs.join("---\n"));
}
