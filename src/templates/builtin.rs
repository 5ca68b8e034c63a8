//! Templates compiled into the binary.

/// Name of the nginx virtual-host template.
pub const VHOST_TEMPLATE: &str = "nginx/vhost.conf.tera";

const VHOST_SOURCE: &str = r#"# php-version: {{ php_version }}
server {
    listen 80;
    server_name {{ hostname }};
    root {{ document_root }};
    index index.php index.html;

    location / {
        try_files $uri $uri/ /index.php?$query_string;
    }

    location ~ \.php$ {
        fastcgi_pass unix:{{ php_socket }};
        fastcgi_index index.php;
        fastcgi_param SCRIPT_FILENAME $document_root$fastcgi_script_name;
        include fastcgi_params;
    }

    location ~ /\.ht {
        deny all;
    }

    error_log /var/log/nginx/{{ hostname }}_error.log;
    access_log /var/log/nginx/{{ hostname }}_access.log;
}
"#;

pub(super) const BUILTIN_TEMPLATES: [(&str, &str); 1] = [(VHOST_TEMPLATE, VHOST_SOURCE)];
